use std::ops::Range;

use geo::Rect;

use super::DecodedLine;
use crate::{
    engine::{check_subrange, Candidate, LineObservation},
    error::SubrangeError,
    geometry::NormalizedRect,
};

/// A recognized line crop. Holds the single greedy-decoded candidate and
/// maps character ranges back onto the crop's columns.
#[derive(Debug, Clone)]
pub struct OnnxObservation {
    /// Crop rectangle in pixels, origin top-left.
    region: Rect<f64>,
    image_size: (f64, f64),
    /// The crop was rotated by 180° before recognition.
    rotated: bool,
    line: DecodedLine,
}

impl OnnxObservation {
    pub fn new(region: Rect<f64>, image_size: (f64, f64), rotated: bool, line: DecodedLine) -> Self {
        Self {
            region,
            image_size,
            rotated,
            line,
        }
    }

    pub fn text(&self) -> &str {
        &self.line.text
    }

    /// The whole line in normalized coordinates.
    pub fn line_box(&self) -> NormalizedRect {
        self.normalize(self.region.min().x, self.region.max().x)
    }

    fn normalize(&self, left: f64, right: f64) -> NormalizedRect {
        let (width, height) = self.image_size;
        Rect::new(
            (left / width, 1.0 - self.region.max().y / height),
            (right / width, 1.0 - self.region.min().y / height),
        )
    }
}

impl LineObservation for OnnxObservation {
    fn top_candidates(&self, n: usize) -> Vec<Candidate> {
        if n == 0 || self.line.text.is_empty() {
            return Vec::new();
        }
        vec![Candidate::new(0, self.line.text.clone(), self.line.confidence())]
    }

    fn bounding_box(
        &self,
        candidate: &Candidate,
        range: Range<usize>,
    ) -> Result<NormalizedRect, SubrangeError> {
        if candidate.rank != 0 {
            return Err(SubrangeError::UnknownCandidate(candidate.rank));
        }
        check_subrange(&self.line.text, &range)?;

        let mut inside = self
            .line
            .chars
            .iter()
            .filter(|it| it.range.start >= range.start && it.range.end <= range.end);
        let first = inside.next().ok_or(SubrangeError::Unresolved(range.clone()))?;
        let last = inside.last().unwrap_or(first);

        let columns = self.line.columns.max(1) as f64;
        let (mut start, mut end) = (
            first.column as f64 / columns,
            (last.column + 1) as f64 / columns,
        );
        if self.rotated {
            (start, end) = (1.0 - end, 1.0 - start);
        }
        let left = self.region.min().x + start * self.region.width();
        let right = self.region.min().x + end * self.region.width();
        Ok(self.normalize(left, right))
    }
}
