//! A local [`OcrEngine`] running PaddleOCR-style models on ONNX Runtime.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ort::{ExecutionProviderDispatch, GraphOptimizationLevel, Session};
use tracing::instrument;

mod angle_net;
mod crnn_net;
mod dbnet;
mod observation;
pub mod util;

use angle_net::AngleNet;
use crnn_net::CrnnNet;
use dbnet::DbNet;
pub use observation::OnnxObservation;
use util::{part_image, scale_normalized};

pub use ort as runtime;

use crate::{EngineError, OcrEngine, Orientation};

const DEFAULT_DET_MODEL: &str = "models/ch_PP-OCRv4_det_infer/ch_PP-OCRv4_det_infer.onnx";
const DEFAULT_REC_MODEL: &str = "models/ch_PP-OCRv4_rec_infer/ch_PP-OCRv4_rec_infer.onnx";
const DEFAULT_REC_KEYS: &str = "models/ppocr_keys_v1.txt";

/// Detected text region in pixel space of the upright image.
#[derive(Debug, Clone)]
pub struct TextBox {
    pub score: f32,
    pub rect: geo::Polygon<f32>,
}

/// Greedy CTC decoding of one line crop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedLine {
    pub text: String,
    pub chars: Vec<DecodedChar>,
    /// Number of output columns the crop was decoded over.
    pub columns: usize,
}

impl DecodedLine {
    /// Mean character score, or zero for an empty line.
    pub fn confidence(&self) -> f32 {
        if self.chars.is_empty() {
            return 0.0;
        }
        self.chars.iter().map(|it| it.score).sum::<f32>() / self.chars.len() as f32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChar {
    /// Byte range in [`DecodedLine::text`].
    pub range: std::ops::Range<usize>,
    pub column: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Angle {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionOptions {
    /// Overrides the engine's maximum side length when non-zero.
    pub max_side_len: u32,
    pub box_score_threshold: f32,
    pub box_threshold: f32,
    pub unclip_ratio: f32,
    /// Rotate every crop the way the majority was classified.
    pub most_angle: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            max_side_len: 0,
            box_score_threshold: 0.5,
            box_threshold: 0.3,
            unclip_ratio: 1.6,
            most_angle: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "tensorrt")]
    TensorRT,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "tensorrt")]
    ExecutionProvider::TensorRT,
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];

/// Input shape profile handed to TensorRT for engine building.
pub(crate) struct ShapeProfile {
    pub min: String,
    pub max: String,
    pub opt: String,
}

#[allow(unused_variables)]
fn dispatch_providers(
    providers: &[ExecutionProvider],
    cache_path: &Path,
    profile: &ShapeProfile,
) -> Vec<ExecutionProviderDispatch> {
    providers
        .iter()
        .filter_map(|provider| -> Option<ExecutionProviderDispatch> {
            match provider {
                ExecutionProvider::Default => None,
                #[cfg(feature = "tensorrt")]
                ExecutionProvider::TensorRT => Some(
                    ort::TensorRTExecutionProvider::default()
                        .with_profile_min_shapes(&profile.min)
                        .with_profile_max_shapes(&profile.max)
                        .with_profile_opt_shapes(&profile.opt)
                        .with_engine_cache(true)
                        .with_engine_cache_path(cache_path.to_string_lossy())
                        .with_timing_cache(true)
                        .with_builder_optimization_level(5)
                        .build(),
                ),
                #[cfg(feature = "coreml")]
                ExecutionProvider::CoreML => Some(ort::CoreMLExecutionProvider::default().build()),
                #[cfg(feature = "cuda")]
                ExecutionProvider::Cuda => Some(ort::CUDAExecutionProvider::default().build()),
                #[cfg(feature = "directml")]
                ExecutionProvider::DirectML => {
                    Some(ort::DirectMLExecutionProvider::default().build())
                }
            }
        })
        .collect()
}

/// Session settings shared by all three networks.
pub(crate) struct SessionSettings<'a> {
    pub threads: usize,
    pub providers: &'a [ExecutionProvider],
    pub cache_path: Option<&'a Path>,
}

impl SessionSettings<'_> {
    fn commit(&self, model_path: &Path, profile: Option<ShapeProfile>) -> ort::Result<Session> {
        #[cfg(feature = "directml")]
        let parallel = !self.providers.contains(&ExecutionProvider::DirectML);
        #[cfg(not(feature = "directml"))]
        let parallel = true;

        let providers = match profile {
            Some(profile) => {
                let cache_path = self
                    .cache_path
                    .map(Path::to_path_buf)
                    .or_else(|| model_path.parent().map(|it| it.join(".cache")))
                    .unwrap_or_else(|| PathBuf::from(".cache"));
                dispatch_providers(self.providers, &cache_path, &profile)
            }
            None => Vec::new(),
        };

        Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_memory_pattern(parallel)?
            .with_parallel_execution(parallel)?
            .with_inter_threads(self.threads)?
            .with_intra_threads(self.threads)?
            .with_execution_providers(providers)?
            .commit_from_file(model_path)
    }
}

pub struct OnnxEngineBuilder {
    threads: usize,
    det_path: Option<PathBuf>,
    cls_path: Option<PathBuf>,
    rec_paths: Option<(PathBuf, PathBuf)>,
    max_side_len: u32,
    cache_path: Option<PathBuf>,
    execution_providers: Vec<ExecutionProvider>,
    options: DetectionOptions,
}

impl OnnxEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn det_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.det_path = Some(path.into());
        self
    }

    pub fn cls_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.cls_path = Some(path.into());
        self
    }

    pub fn rec_model(
        mut self,
        model_path: impl Into<PathBuf>,
        keys_path: impl Into<PathBuf>,
    ) -> Self {
        self.rec_paths = Some((model_path.into(), keys_path.into()));
        self
    }

    pub fn max_side_len(mut self, max_side_len: u32) -> Self {
        self.max_side_len = max_side_len;
        self
    }

    pub fn with_engine_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_execution_providers(
        mut self,
        providers: impl IntoIterator<Item = ExecutionProvider>,
    ) -> Self {
        self.execution_providers = providers.into_iter().collect();
        self
    }

    pub fn detection_options(mut self, options: DetectionOptions) -> Self {
        self.options = options;
        self
    }

    #[instrument(skip(self))]
    pub fn build(self) -> Result<OnnxEngine, EngineError> {
        let settings = SessionSettings {
            threads: self.threads,
            providers: &self.execution_providers,
            cache_path: self.cache_path.as_deref(),
        };
        let det_path = self.det_path.unwrap_or_else(|| DEFAULT_DET_MODEL.into());
        let (rec_path, keys_path) = self
            .rec_paths
            .unwrap_or_else(|| (DEFAULT_REC_MODEL.into(), DEFAULT_REC_KEYS.into()));

        let det_model = DbNet::init(&det_path, &settings, self.max_side_len)?;
        let cls_model = self
            .cls_path
            .map(|path| AngleNet::init(&path, &settings))
            .transpose()?;
        let rec_model = CrnnNet::init(&rec_path, &keys_path, &settings)?;

        Ok(OnnxEngine {
            det_model,
            cls_model,
            rec_model,
            max_side_len: self.max_side_len,
            options: self.options,
        })
    }
}

impl Default for OnnxEngineBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            det_path: None,
            cls_path: None,
            rec_paths: None,
            max_side_len: 1024,
            cache_path: None,
            execution_providers: DEFAULT_PROVIDERS.to_vec(),
            options: DetectionOptions::default(),
        }
    }
}

pub struct OnnxEngine {
    det_model: DbNet,
    cls_model: Option<AngleNet>,
    rec_model: CrnnNet,
    max_side_len: u32,
    options: DetectionOptions,
}

impl OnnxEngine {
    pub fn builder() -> OnnxEngineBuilder {
        OnnxEngineBuilder::new()
    }

    fn effective_max_side_len(&self) -> u32 {
        match self.options.max_side_len {
            0 => self.max_side_len,
            len => len.min(self.max_side_len),
        }
    }
}

impl OcrEngine for OnnxEngine {
    type Observation = OnnxObservation;

    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    fn perform(
        &self,
        image: &DynamicImage,
        orientation: Orientation,
        languages: &[String],
    ) -> Result<Vec<OnnxObservation>, EngineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EngineError::InvalidImage(format!(
                "image has no pixels ({}x{})",
                image.width(),
                image.height()
            )));
        }
        if !languages.is_empty() {
            log::debug!("Language hints {languages:?} are fixed by the recognition key file");
        }

        let image = orientation.apply(image);
        let max_side_len = match self.effective_max_side_len() {
            0 => u32::MAX,
            len => len,
        };
        let scale = scale_normalized(&image, max_side_len);
        let boxes = self.det_model.get_text_boxes(
            &image,
            scale,
            self.options.box_score_threshold,
            self.options.box_threshold,
            self.options.unclip_ratio,
        )?;

        let (mut crops, regions): (Vec<_>, Vec<_>) = boxes
            .iter()
            .filter_map(|it| {
                part_image(&image, &it.rect).map(|(crop, region)| (crop, (region, it.score)))
            })
            .unzip();
        #[cfg(feature = "debug")]
        for (i, crop) in crops.iter().enumerate() {
            if let Err(err) = crop.save(format!("part_images/{i}.png")) {
                log::warn!("Failed to save crop {i}: {err}");
            }
        }

        let mut rotated = vec![false; crops.len()];
        if let Some(angle_net) = &self.cls_model {
            let angles = angle_net.get_angles(&crops, self.options.most_angle)?;
            for ((crop, angle), rotated) in crops.iter_mut().zip(angles).zip(rotated.iter_mut()) {
                if angle.index == 1 {
                    *crop = crop.rotate180();
                    *rotated = true;
                }
            }
        }

        let lines = self.rec_model.get_text_lines(&crops)?;
        let image_size = (image.width() as f64, image.height() as f64);

        Ok(regions
            .into_iter()
            .zip(rotated)
            .zip(lines)
            .filter(|(_, line)| !line.text.is_empty())
            .map(|(((region, score), rotated), line)| {
                let observation = OnnxObservation::new(region, image_size, rotated, line);
                log::trace!(
                    "Line {:?} at {:?}, detection score {score}",
                    observation.text(),
                    observation.line_box()
                );
                observation
            })
            .collect())
    }
}
