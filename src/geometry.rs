use geo::{Coord, Rect};
use serde::Serialize;

/// A rectangle in normalized image coordinates: both axes span `0..=1` and
/// the origin is the bottom-left corner of the upright image.
pub type NormalizedRect = Rect<f64>;

/// The rectangle used when a word's geometry cannot be resolved.
pub fn zero_rect() -> NormalizedRect {
    Rect::new(Coord::zero(), Coord::zero())
}

/// Where the vertical axis of a [`PixelRect`] starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerticalOrigin {
    /// y grows upward from the bottom edge, so `top` is the numeric maximum.
    #[default]
    BottomLeft,
    /// y grows downward from the top edge, so `top` is the numeric minimum.
    TopLeft,
}

/// A bounding box in pixel space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl PixelRect {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        (self.top - self.bottom).abs()
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }
}

/// Scales a normalized rectangle to pixel space, keeping the bottom-left origin.
pub fn to_pixel_rect(rect: NormalizedRect, width: f64, height: f64) -> PixelRect {
    to_pixel_rect_with_origin(rect, width, height, VerticalOrigin::BottomLeft)
}

pub fn to_pixel_rect_with_origin(
    rect: NormalizedRect,
    width: f64,
    height: f64,
    origin: VerticalOrigin,
) -> PixelRect {
    let (min, max) = (rect.min(), rect.max());
    let (top, bottom) = match origin {
        VerticalOrigin::BottomLeft => (max.y * height, min.y * height),
        VerticalOrigin::TopLeft => ((1.0 - max.y) * height, (1.0 - min.y) * height),
    };
    PixelRect {
        left: min.x * width,
        top,
        right: max.x * width,
        bottom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_maps_to_image_size() {
        let rect = Rect::new((0.0, 0.0), (1.0, 1.0));
        let pixels = to_pixel_rect(rect, 100.0, 50.0);
        assert_eq!(
            pixels,
            PixelRect {
                left: 0.0,
                top: 50.0,
                right: 100.0,
                bottom: 0.0
            }
        );
    }

    #[test]
    fn top_left_origin_flips_vertical_axis() {
        let rect = Rect::new((0.25, 0.1), (0.5, 0.3));
        let pixels = to_pixel_rect_with_origin(rect, 200.0, 100.0, VerticalOrigin::TopLeft);
        assert_eq!(pixels.left, 50.0);
        assert_eq!(pixels.right, 100.0);
        assert!((pixels.top - 70.0).abs() < 1e-9);
        assert!((pixels.bottom - 90.0).abs() < 1e-9);
    }

    #[test]
    fn zero_rect_stays_degenerate() {
        let pixels = to_pixel_rect(zero_rect(), 640.0, 480.0);
        assert_eq!(pixels, PixelRect::default());
        assert!(pixels.is_degenerate());
    }
}
