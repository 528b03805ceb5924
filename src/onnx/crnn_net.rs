use std::path::Path;

use float_ord::FloatOrd;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{ArrayView2, Axis};
use ort::{inputs, Session};
use tracing::instrument;

use super::{util::subtract_mean_normalize, DecodedChar, DecodedLine, SessionSettings, ShapeProfile};
use crate::EngineError;

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

const DEST_HEIGHT: u32 = 48;

/// CTC text recognizer. Key 0 is the blank.
pub struct CrnnNet {
    session: Session,
    keys: Vec<String>,
}

impl CrnnNet {
    #[instrument(level = "debug", skip(settings))]
    pub fn init(
        model_path: &Path,
        keys_path: &Path,
        settings: &SessionSettings,
    ) -> Result<Self, EngineError> {
        let profile = ShapeProfile {
            min: format!("x:1x3x{DEST_HEIGHT}x1"),
            max: format!("x:1x3x{DEST_HEIGHT}x{}", u16::MAX),
            opt: format!("x:1x3x{DEST_HEIGHT}x256"),
        };
        let session = settings.commit(model_path, Some(profile))?;

        let keys = std::fs::read_to_string(keys_path).map_err(|source| EngineError::Io {
            path: keys_path.to_path_buf(),
            source,
        })?;
        let keys = ["#".to_string()]
            .into_iter()
            .chain(keys.lines().map(str::to_string))
            .chain([" ".to_string()])
            .collect::<Vec<_>>();

        log::debug!("CRNN loaded {} keys", keys.len());
        log::debug!("CRNN Inputs: {:?}", session.inputs);

        Ok(Self { session, keys })
    }

    #[instrument(level = "debug", skip(self, images))]
    pub fn get_text_lines(&self, images: &[DynamicImage]) -> Result<Vec<DecodedLine>, EngineError> {
        images
            .iter()
            .map(|image| self.get_text_line(image))
            .collect()
    }

    #[instrument(level = "trace", skip(self, image))]
    fn get_text_line(&self, image: &DynamicImage) -> Result<DecodedLine, EngineError> {
        let scale = DEST_HEIGHT as f32 / image.height() as f32;
        let dest_width = ((image.width() as f32 * scale) as u32).clamp(1, u16::MAX as u32);
        let image = image.resize_exact(dest_width, DEST_HEIGHT, FilterType::Nearest);

        let tensor_values =
            subtract_mean_normalize(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => tensor_values]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| EngineError::Internal("recognizer returned no outputs".into()))?;
        let output_tensor = output.try_extract_tensor::<f32>()?;

        log::trace!("Output tensor size: {:?}", output_tensor.dim());
        let columns = output_tensor.len_of(Axis(1));
        let classes = output_tensor.len_of(Axis(2));

        let output_tensor = output_tensor.remove_axis(Axis(0));
        let output = output_tensor
            .to_shape((columns, classes))
            .map_err(|err| EngineError::Internal(format!("recognizer output shape: {err}")))?;

        Ok(ctc_decode(&self.keys, output.view()))
    }
}

/// Greedy CTC decoding: best class per column, repeats collapsed, blanks
/// and out-of-vocabulary classes dropped.
pub(crate) fn ctc_decode(keys: &[String], data: ArrayView2<f32>) -> DecodedLine {
    let mut line = DecodedLine {
        columns: data.len_of(Axis(0)),
        ..Default::default()
    };
    let mut previous = None;
    for (column, scores) in data.outer_iter().enumerate() {
        let Some((index, score)) = scores
            .indexed_iter()
            .max_by_key(|(_, value)| FloatOrd(**value))
            .map(|(index, value)| (index, *value))
        else {
            continue;
        };
        if previous == Some(index) {
            continue;
        }
        previous = Some(index);
        if index == 0 || index >= keys.len() {
            continue;
        }
        let start = line.text.len();
        line.text.push_str(&keys[index]);
        line.chars.push(DecodedChar {
            range: start..line.text.len(),
            column,
            score,
        });
    }
    line
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    fn keys() -> Vec<String> {
        ["#", "a", "b", " "].iter().map(|it| it.to_string()).collect()
    }

    /// One row per column, putting `score` on the given class.
    fn columns(classes: &[usize], score: f32) -> Array2<f32> {
        let mut data = Array2::<f32>::zeros((classes.len(), 5));
        for (column, &class) in classes.iter().enumerate() {
            data[[column, class]] = score;
        }
        data
    }

    #[test]
    fn repeats_collapse_and_blanks_separate() {
        let line = ctc_decode(&keys(), columns(&[1, 1, 0, 1, 2, 2, 3, 2], 0.8).view());
        assert_eq!(line.text, "aab b");
        assert_eq!(line.columns, 8);
        let positions = line.chars.iter().map(|it| it.column).collect::<Vec<_>>();
        assert_eq!(positions, [0, 3, 4, 6, 7]);
        assert!((line.confidence() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unknown_classes_are_dropped() {
        let line = ctc_decode(&keys(), columns(&[4, 1], 0.5).view());
        assert_eq!(line.text, "a");
        assert_eq!(line.chars[0].column, 1);
    }

    #[test]
    fn blank_only_line_is_empty() {
        let line = ctc_decode(&keys(), columns(&[0, 0, 0], 0.9).view());
        assert!(line.text.is_empty());
        assert_eq!(line.confidence(), 0.0);
    }
}
