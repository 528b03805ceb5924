use std::ops::Range;

use tracing::instrument;

use crate::{
    assemble::PassContext,
    engine::{Candidate, LineObservation},
    geometry::{to_pixel_rect_with_origin, zero_rect},
    result::WordElement,
};

/// Splits `text` on single spaces, yielding every token with its byte range
/// in `text`. Consecutive, leading and trailing spaces produce empty tokens.
pub fn tokens(text: &str) -> impl Iterator<Item = (&str, Range<usize>)> {
    let mut offset = 0;
    text.split(' ').map(move |word| {
        let range = offset..offset + word.len();
        offset = range.end + 1;
        (word, range)
    })
}

/// Segments one candidate into word elements. A word whose geometry cannot
/// be resolved gets a zero rectangle; the remaining words are unaffected.
#[instrument(level = "trace", skip_all, fields(rank = candidate.rank))]
pub fn segment<O>(candidate: &Candidate, observation: &O, ctx: &PassContext) -> Vec<WordElement>
where
    O: LineObservation + ?Sized,
{
    tokens(&candidate.text)
        .map(|(word, range)| {
            let rect = observation
                .bounding_box(candidate, range)
                .unwrap_or_else(|err| {
                    log::trace!("No box for {word:?} in {:?}: {err}", candidate.text);
                    zero_rect()
                });
            WordElement {
                text: word.to_string(),
                confidence: candidate.confidence,
                bounding_box: to_pixel_rect_with_origin(
                    rect,
                    ctx.width(),
                    ctx.height(),
                    ctx.options.vertical_origin,
                ),
                recognized_language: ctx.options.recognized_language.clone(),
            }
        })
        .collect()
}
