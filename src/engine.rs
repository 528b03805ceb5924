//! The boundary to the OCR engine that produces line observations.

use std::ops::Range;

use image::DynamicImage;

use crate::{
    error::{EngineError, SubrangeError},
    geometry::NormalizedRect,
};

/// One ranked textual interpretation of a line observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Position in the engine's best-first ranking.
    pub rank: usize,
    pub text: String,
    /// Confidence in `0..=1`.
    pub confidence: f32,
}

impl Candidate {
    pub fn new(rank: usize, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            rank,
            text: text.into(),
            confidence,
        }
    }
}

/// One detected text-bearing line region.
pub trait LineObservation {
    /// Up to `n` candidates, best first.
    fn top_candidates(&self, n: usize) -> Vec<Candidate>;

    /// Resolves the normalized geometry of the byte range `range` within
    /// `candidate.text`.
    fn bounding_box(
        &self,
        candidate: &Candidate,
        range: Range<usize>,
    ) -> Result<NormalizedRect, SubrangeError>;
}

/// An OCR engine. `perform` runs to completion on the calling thread.
pub trait OcrEngine: Send + Sync {
    type Observation: LineObservation;

    fn perform(
        &self,
        image: &DynamicImage,
        orientation: Orientation,
        languages: &[String],
    ) -> Result<Vec<Self::Observation>, EngineError>;
}

/// Validates a byte range against `text` the way every observation should
/// before resolving geometry.
pub fn check_subrange(text: &str, range: &Range<usize>) -> Result<(), SubrangeError> {
    if range.end > text.len() || range.start > range.end {
        return Err(SubrangeError::OutOfBounds {
            range: range.clone(),
            len: text.len(),
        });
    }
    if range.is_empty() {
        return Err(SubrangeError::Empty(range.clone()));
    }
    if !text.is_char_boundary(range.start) || !text.is_char_boundary(range.end) {
        return Err(SubrangeError::NotCharBoundary(range.clone()));
    }
    Ok(())
}

/// How the stored pixels must be transformed to show the image upright.
/// Discriminants match the EXIF orientation tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Orientation {
    #[default]
    Up = 1,
    UpMirrored = 2,
    Down = 3,
    DownMirrored = 4,
    LeftMirrored = 5,
    Right = 6,
    RightMirrored = 7,
    Left = 8,
}

impl Orientation {
    pub fn from_exif(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Up,
            2 => Self::UpMirrored,
            3 => Self::Down,
            4 => Self::DownMirrored,
            5 => Self::LeftMirrored,
            6 => Self::Right,
            7 => Self::RightMirrored,
            8 => Self::Left,
            _ => return None,
        })
    }

    /// Whether uprighting the image swaps its width and height.
    pub fn transposes(self) -> bool {
        matches!(
            self,
            Self::LeftMirrored | Self::Right | Self::RightMirrored | Self::Left
        )
    }

    /// Dimensions of the upright image.
    pub fn display_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.transposes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    pub fn apply(self, image: &DynamicImage) -> DynamicImage {
        match self {
            Self::Up => image.clone(),
            Self::UpMirrored => image.fliph(),
            Self::Down => image.rotate180(),
            Self::DownMirrored => image.flipv(),
            Self::LeftMirrored => image.rotate90().fliph(),
            Self::Right => image.rotate90(),
            Self::RightMirrored => image.rotate270().fliph(),
            Self::Left => image.rotate270(),
        }
    }
}

/// The per-pass snapshot of what was asked for. Never shared between passes.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionRequest {
    /// Width of the upright image, not necessarily the stored pixel width.
    pub width: u32,
    /// Height of the upright image.
    pub height: u32,
    pub languages: Vec<String>,
}

impl RecognitionRequest {
    pub fn new(image: &DynamicImage, orientation: Orientation, languages: Vec<String>) -> Self {
        let (width, height) = orientation.display_dimensions(image.width(), image.height());
        Self {
            width,
            height,
            languages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subrange_checks() {
        let text = "héllo wörld";
        assert_eq!(check_subrange(text, &(0..6)), Ok(()));
        assert_eq!(check_subrange(text, &(3..3)), Err(SubrangeError::Empty(3..3)));
        assert_eq!(
            check_subrange(text, &(0..2)),
            Err(SubrangeError::NotCharBoundary(0..2))
        );
        assert!(matches!(
            check_subrange(text, &(0..40)),
            Err(SubrangeError::OutOfBounds { len: 13, .. })
        ));
    }

    #[test]
    fn transposing_orientations_swap_dimensions() {
        let image = DynamicImage::new_rgb8(100, 50);
        let request = RecognitionRequest::new(&image, Orientation::Right, vec!["en-US".into()]);
        assert_eq!((request.width, request.height), (50, 100));

        let upright = Orientation::Right.apply(&image);
        assert_eq!((upright.width(), upright.height()), (50, 100));

        let request = RecognitionRequest::new(&image, Orientation::Down, vec![]);
        assert_eq!((request.width, request.height), (100, 50));
    }

    #[test]
    fn exif_values_round_trip() {
        for value in 1..=8 {
            let orientation = Orientation::from_exif(value).unwrap();
            assert_eq!(orientation as u8, value);
        }
        assert_eq!(Orientation::from_exif(0), None);
        assert_eq!(Orientation::from_exif(9), None);
    }
}
