use std::sync::Arc;

use image::DynamicImage;
use tracing::instrument;

pub mod assemble;
pub mod dedup;
pub mod engine;
mod error;
pub mod geometry;
#[cfg(feature = "onnx")]
pub mod onnx;
mod result;
pub mod segment;

pub use assemble::{AssemblyOptions, FullText, PassContext};
pub use engine::{Candidate, LineObservation, OcrEngine, Orientation, RecognitionRequest};
pub use error::*;
pub use geometry::{NormalizedRect, PixelRect, VerticalOrigin};
pub use result::*;

pub struct TextRecognizerBuilder {
    options: AssemblyOptions,
}

impl TextRecognizerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_candidates(mut self, max_candidates: usize) -> Self {
        self.options.max_candidates = max_candidates;
        self
    }

    pub fn recognized_language(mut self, language: impl Into<String>) -> Self {
        self.options.recognized_language = language.into();
        self
    }

    pub fn vertical_origin(mut self, origin: VerticalOrigin) -> Self {
        self.options.vertical_origin = origin;
        self
    }

    pub fn full_text(mut self, full_text: FullText) -> Self {
        self.options.full_text = full_text;
        self
    }

    pub fn build<E: OcrEngine>(self, engine: E) -> TextRecognizer<E> {
        TextRecognizer {
            engine: Arc::new(engine),
            options: Arc::new(self.options),
        }
    }
}

impl Default for TextRecognizerBuilder {
    fn default() -> Self {
        Self {
            options: AssemblyOptions::default(),
        }
    }
}

/// Runs an [`OcrEngine`] and reshapes its observations into a
/// [`RecognitionDocument`]. Cloning is cheap and clones share the engine.
pub struct TextRecognizer<E> {
    engine: Arc<E>,
    options: Arc<AssemblyOptions>,
}

impl<E> Clone for TextRecognizer<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            options: Arc::clone(&self.options),
        }
    }
}

impl<E: OcrEngine> TextRecognizer<E> {
    pub fn new(engine: E) -> Self {
        TextRecognizerBuilder::default().build(engine)
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Recognizes text on the current thread.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn recognize_blocking(
        &self,
        image: &DynamicImage,
        languages: &[String],
        orientation: Orientation,
    ) -> Result<RecognitionDocument, EngineError> {
        let request = RecognitionRequest::new(image, orientation, languages.to_vec());
        run_pass(self.engine.as_ref(), &self.options, image, orientation, &request)
    }
}

impl<E: OcrEngine + 'static> TextRecognizer<E> {
    /// Recognizes text on the blocking thread pool. Resolves once with the
    /// document or rejects once with the engine's error; nothing is retried.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub async fn recognize(
        &self,
        image: DynamicImage,
        languages: Vec<String>,
        orientation: Orientation,
    ) -> Result<RecognitionDocument, RecognitionError> {
        let engine = Arc::clone(&self.engine);
        let options = Arc::clone(&self.options);
        let span = tracing::Span::current();
        let document = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let request = RecognitionRequest::new(&image, orientation, languages);
            run_pass(engine.as_ref(), &options, &image, orientation, &request)
        })
        .await??;
        Ok(document)
    }
}

fn run_pass<E: OcrEngine + ?Sized>(
    engine: &E,
    options: &AssemblyOptions,
    image: &DynamicImage,
    orientation: Orientation,
    request: &RecognitionRequest,
) -> Result<RecognitionDocument, EngineError> {
    let observations = engine
        .perform(image, orientation, &request.languages)
        .inspect_err(|err| log::error!("Failed to perform text recognition: {err}"))?;
    if observations.is_empty() {
        log::info!("No text found");
    } else {
        log::debug!("Engine returned {} observations", observations.len());
    }
    Ok(assemble::assemble(
        &observations,
        &PassContext::new(request, options),
    ))
}
