use std::path::Path;

use float_ord::FloatOrd;
use image::{imageops::FilterType, DynamicImage};
use ndarray::Axis;
use ort::{inputs, Session};
use tracing::instrument;

use super::{util::subtract_mean_normalize, Angle, SessionSettings};
use crate::EngineError;

const DEST_WIDTH: u32 = 192;
const DEST_HEIGHT: u32 = 48;

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

/// Classifies line crops as upright (0) or upside down (1).
pub struct AngleNet {
    session: Session,
}

impl AngleNet {
    #[instrument(level = "debug", skip(settings))]
    pub fn init(path: &Path, settings: &SessionSettings) -> Result<Self, EngineError> {
        let session = settings.commit(path, None)?;
        log::debug!("Angle session inputs: {:?}", session.inputs);
        Ok(Self { session })
    }

    #[instrument(level = "debug", skip(self, images))]
    pub fn get_angles(
        &self,
        images: &[DynamicImage],
        most_angle: bool,
    ) -> Result<Vec<Angle>, EngineError> {
        let mut angles = images
            .iter()
            .map(|image| self.get_angle(image))
            .collect::<Result<Vec<_>, _>>()?;

        if most_angle {
            let index = majority_index(&angles);
            for angle in angles.iter_mut() {
                angle.index = index;
            }
        }

        Ok(angles)
    }

    #[instrument(level = "trace", skip(self, image))]
    fn get_angle(&self, image: &DynamicImage) -> Result<Angle, EngineError> {
        let image = image.resize_exact(DEST_WIDTH, DEST_HEIGHT, FilterType::Nearest);
        let input =
            subtract_mean_normalize(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => input]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| EngineError::Internal("angle classifier returned no outputs".into()))?;
        let output = output.try_extract_tensor::<f32>()?.remove_axis(Axis(0));

        output
            .iter()
            .enumerate()
            .max_by_key(|(_, score)| FloatOrd(**score))
            .map(|(index, score)| Angle {
                index,
                score: *score,
            })
            .ok_or_else(|| EngineError::Internal("angle classifier returned no scores".into()))
    }
}

/// Index 1 wins only when at least half of the crops voted for it.
fn majority_index(angles: &[Angle]) -> usize {
    let flipped = angles.iter().map(|angle| angle.index).sum::<usize>() as f32;
    if flipped < angles.len() as f32 / 2.0 {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angles(indices: &[usize]) -> Vec<Angle> {
        indices
            .iter()
            .map(|&index| Angle { index, score: 0.9 })
            .collect()
    }

    #[test]
    fn majority_vote() {
        assert_eq!(majority_index(&angles(&[0, 0, 1])), 0);
        assert_eq!(majority_index(&angles(&[1, 0, 1])), 1);
        assert_eq!(majority_index(&angles(&[1, 0])), 1);
    }
}
