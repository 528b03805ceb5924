use std::path::Path;

use geo::{Coord, MinimumRotatedRect, Scale};
use image::{imageops::FilterType, DynamicImage, GrayImage};
use imageproc::{
    contours::find_contours,
    contrast::{threshold_mut, ThresholdType},
    distance_transform::Norm,
    morphology::dilate_mut,
};
use ndarray::{ArrayView2, Axis};
use ort::{inputs, Session};
use tracing::instrument;

use super::{
    util::{self, box_score_fast, max_side, subtract_mean_normalize, to_geo_poly, to_luma_image, unclip},
    SessionSettings, ShapeProfile, TextBox,
};
use crate::EngineError;

const MEAN_VALUES: [f32; 3] = [0.485, 0.456, 0.406];
const NORM_VALUES: [f32; 3] = [1.0 / 0.229, 1.0 / 0.224, 1.0 / 0.225];

const LONG_SIDE_THRESHOLD: f32 = 3.0;
const MAX_CANDIDATES: usize = 1000;

/// Differentiable-binarization text detector.
pub struct DbNet {
    session: Session,
}

impl DbNet {
    #[instrument(level = "debug", skip(settings))]
    pub fn init(
        path: &Path,
        settings: &SessionSettings,
        max_side_len: u32,
    ) -> Result<Self, EngineError> {
        let profile = ShapeProfile {
            min: "x:1x3x32x32".to_string(),
            max: format!("x:1x3x{max_side_len}x{max_side_len}"),
            opt: format!("x:1x3x{max_side_len}x{max_side_len}"),
        };
        let session = settings.commit(path, Some(profile))?;
        Ok(Self { session })
    }

    #[instrument(skip(self, image), level = "debug")]
    pub fn get_text_boxes(
        &self,
        image: &DynamicImage,
        scale: util::Scale,
        box_score_thresh: f32,
        box_thresh: f32,
        unclip_ratio: f32,
    ) -> Result<Vec<TextBox>, EngineError> {
        let image =
            image.resize_exact(scale.target_width, scale.target_height, FilterType::Nearest);
        let input_values =
            subtract_mean_normalize(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => input_values]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| EngineError::Internal("detector returned no outputs".into()))?;
        let pred_mat = output.try_extract_tensor::<f32>()?;

        let width = pred_mat.len_of(Axis(3));
        let height = pred_mat.len_of(Axis(2));
        let pred_data = pred_mat
            .to_owned()
            .remove_axis(Axis(0))
            .remove_axis(Axis(0));
        let pred_data = pred_data
            .to_shape((height, width))
            .map_err(|err| EngineError::Internal(format!("detector output shape: {err}")))?;

        let mut mask = to_luma_image(pred_data.view())
            .ok_or_else(|| EngineError::Internal("detector output is not a bitmap".into()))?;
        let threshold = (box_thresh * 255.0) as u8;
        threshold_mut(&mut mask, threshold, ThresholdType::Binary);
        dilate_mut(&mut mask, Norm::L1, 2);

        let boxes = find_boxes(pred_data.view(), &mask, scale, box_score_thresh, unclip_ratio);
        log::debug!("Detected {} text regions", boxes.len());
        Ok(boxes)
    }
}

#[instrument(skip(pred_data, mask), level = "trace")]
fn find_boxes(
    pred_data: ArrayView2<f32>,
    mask: &GrayImage,
    util::Scale {
        factor_x, factor_y, ..
    }: util::Scale,
    box_score_threshold: f32,
    unclip_ratio: f32,
) -> Vec<TextBox> {
    find_contours::<i32>(mask)
        .into_iter()
        .take(MAX_CANDIDATES)
        .filter(|it| it.points.len() > 2)
        .filter_map(|it| to_geo_poly(&it.points).minimum_rotated_rect())
        .filter(|rect| max_side(rect) >= LONG_SIDE_THRESHOLD)
        .map(|rect| {
            let score = box_score_fast(&rect, pred_data);
            (rect, score)
        })
        .filter(|(_, score)| *score >= box_score_threshold)
        .filter_map(|(rect, score)| Some((unclip(rect, unclip_ratio)?, score)))
        .filter(|(grown, _)| max_side(grown) >= LONG_SIDE_THRESHOLD + 2.0)
        .map(|(rect, score)| TextBox {
            score,
            rect: rect.scale_around_point(factor_x, factor_y, Coord::zero()),
        })
        .collect()
}
