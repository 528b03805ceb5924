use tracing::instrument;

use crate::{
    dedup::dedupe,
    engine::{LineObservation, RecognitionRequest},
    geometry::VerticalOrigin,
    result::{Block, Line, RecognitionDocument},
    segment::segment,
};

/// What goes into [`RecognitionDocument::text`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FullText {
    /// Left empty. Existing consumers of this document shape expect no full text.
    #[default]
    Omitted,
    /// The best candidate of every non-empty block, one per line.
    Joined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyOptions {
    /// How many ranked candidates to request per observation.
    pub max_candidates: usize,
    /// Language tag stamped on every word.
    pub recognized_language: String,
    pub vertical_origin: VerticalOrigin,
    pub full_text: FullText,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            recognized_language: "eng".to_string(),
            vertical_origin: VerticalOrigin::default(),
            full_text: FullText::default(),
        }
    }
}

/// State scoped to one recognition pass.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub request: &'a RecognitionRequest,
    pub options: &'a AssemblyOptions,
}

impl<'a> PassContext<'a> {
    pub fn new(request: &'a RecognitionRequest, options: &'a AssemblyOptions) -> Self {
        Self { request, options }
    }

    pub fn width(&self) -> f64 {
        self.request.width as f64
    }

    pub fn height(&self) -> f64 {
        self.request.height as f64
    }
}

/// Builds a document with exactly one block per observation, in input order.
#[instrument(level = "debug", skip_all, fields(observations = observations.len()))]
pub fn assemble<O: LineObservation>(observations: &[O], ctx: &PassContext) -> RecognitionDocument {
    let mut full_text = Vec::new();
    let blocks = observations
        .iter()
        .map(|observation| {
            let candidates = dedupe(observation.top_candidates(ctx.options.max_candidates));
            if let Some(best) = candidates.first() {
                full_text.push(best.text.clone());
            }
            let lines = candidates
                .iter()
                .map(|candidate| Line {
                    elements: segment(candidate, observation, ctx),
                })
                .collect();
            Block { lines }
        })
        .collect::<Vec<_>>();

    let text = match ctx.options.full_text {
        FullText::Omitted => String::new(),
        FullText::Joined => full_text.join("\n"),
    };
    RecognitionDocument { text, blocks }
}
