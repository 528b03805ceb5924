use geo::{
    point, Area, BoundingRect, Contains, Coord, EuclideanLength, HasDimensions, LineString,
    MinimumRotatedRect, Polygon, Rect, Translate,
};
use geo_clipper::{Clipper, EndType, JoinType};
use image::{DynamicImage, GrayImage, ImageBuffer, Pixel, Rgb};
use imageproc::point::Point;
use ndarray::{s, Array3, ArrayView2, Axis};
use tracing::instrument;

/// Scales channels into the layout the networks expect: `(channel, y, x)`.
#[instrument(level = "debug", skip(image))]
pub(crate) fn subtract_mean_normalize(
    image: &DynamicImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array3<f32> {
    let mut image = image.to_rgb32f();
    let norm = Rgb::<f32>(*norm_vals);
    let mean_vals = Rgb::<f32>(*mean_vals).map2(&norm, |c1, c2| c1 * c2);
    for pixel in image.pixels_mut() {
        *pixel = pixel
            .map2(&norm, |c1, c2| c1 * c2)
            .map2(&mean_vals, |c1, c2| c1 - c2);
    }
    Array3::<f32>::from_shape_fn(
        (3, image.height() as usize, image.width() as usize),
        |(ch, y, x)| image.get_pixel(x as u32, y as u32).channels()[ch],
    )
}

pub(crate) fn to_luma_image(data: ArrayView2<f32>) -> Option<GrayImage> {
    let height = data.len_of(Axis(0));
    let width = data.len_of(Axis(1));
    let pixel_data = data
        .axis_iter(Axis(0))
        .flat_map(|it| it.into_iter())
        .map(|p| (p * 255.0) as u8)
        .collect::<Vec<u8>>();
    ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
}

pub(crate) fn to_geo_poly(points: &[Point<i32>]) -> Polygon<f32> {
    let points = points
        .iter()
        .map(|point| Coord {
            x: point.x as f32,
            y: point.y as f32,
        })
        .collect();
    Polygon::new(LineString::new(points), vec![])
}

pub(crate) fn max_side(rect: &Polygon<f32>) -> f32 {
    rect.exterior()
        .lines()
        .map(|it| it.euclidean_length() as i32)
        .max()
        .unwrap_or_default() as f32
}

/// Mean probability inside `rect`; NaN when it covers no pixels.
pub(crate) fn box_score_fast(rect: &Polygon<f32>, pred_data: ArrayView2<f32>) -> f32 {
    let Some(bounds) = rect.bounding_rect() else {
        return f32::NAN;
    };
    let (rows, cols) = pred_data.dim();
    let min = bounds.min();
    let max = bounds.max();
    let (x0, x1) = ((min.x.max(0.0) as usize).min(cols), (max.x.max(0.0) as usize).min(cols));
    let (y0, y1) = ((min.y.max(0.0) as usize).min(rows), (max.y.max(0.0) as usize).min(rows));

    let sliced = pred_data.slice(s![y0..y1, x0..x1]);
    let local_rect = rect.translate(-(x0 as f32), -(y0 as f32));

    let (sum, count) = sliced
        .indexed_iter()
        .filter(|((y, x), _)| local_rect.contains(&point![x: *x as f32, y: *y as f32]))
        .fold((0.0, 0usize), |(sum, count), (_, value)| (sum + value, count + 1));
    sum / count as f32
}

/// Grows a detected box by an area/perimeter proportional distance.
pub(crate) fn unclip(rect: Polygon<f32>, unclip_ratio: f32) -> Option<Polygon<f32>> {
    let distance = (rect.unsigned_area() * 0.5 * unclip_ratio) / rect.exterior().euclidean_length();

    let grown = rect.offset(distance, JoinType::Round(0.25), EndType::ClosedPolygon, 1.0);

    if grown.is_empty() {
        None
    } else {
        grown.minimum_rotated_rect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub factor_x: f32,
    pub factor_y: f32,
    pub target_width: u32,
    pub target_height: u32,
}

/// Fits the image into `target_size` along its long side, flooring both
/// sides to multiples of 32.
pub fn scale_normalized(image: &DynamicImage, target_size: u32) -> Scale {
    let aspect_ratio = image.width() as f32 / image.height() as f32;
    let (width, height) = if aspect_ratio >= 1.0 {
        let width = image.width().min(target_size);
        (width, (width as f32 / aspect_ratio) as u32)
    } else {
        let height = image.height().min(target_size);
        ((height as f32 * aspect_ratio) as u32, height)
    };
    let target_width = (width / 32 * 32).max(32);
    let target_height = (height / 32 * 32).max(32);
    let scale = Scale {
        factor_x: image.width() as f32 / target_width as f32,
        factor_y: image.height() as f32 / target_height as f32,
        target_width,
        target_height,
    };
    log::debug!(
        "Resizing (w: {}, h: {}) to (w: {target_width}, h: {target_height}), factor ({}, {})",
        image.width(),
        image.height(),
        scale.factor_x,
        scale.factor_y
    );
    scale
}

/// Crops the axis-aligned bounds of `region`, returning the crop together
/// with the rectangle it covers. `None` if nothing of it lies in the image.
pub(crate) fn part_image(
    image: &DynamicImage,
    region: &Polygon<f32>,
) -> Option<(DynamicImage, Rect<f64>)> {
    let rect = region.bounding_rect()?;
    let x = (rect.min().x.max(0.0) as u32).min(image.width());
    let y = (rect.min().y.max(0.0) as u32).min(image.height());
    let width = (rect.width() as u32).min(image.width() - x);
    let height = (rect.height() as u32).min(image.height() - y);
    if width == 0 || height == 0 {
        log::trace!("Skipping empty crop {rect:?}");
        return None;
    }
    let covered = Rect::new(
        (x as f64, y as f64),
        ((x + width) as f64, (y + height) as f64),
    );
    Some((image.crop_imm(x, y, width, height), covered))
}
