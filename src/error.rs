use std::ops::Range;

use thiserror::Error;

/// Failure of the OCR engine call itself. Never retried.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("{0}")]
    Internal(String),
    #[cfg(feature = "onnx")]
    #[error("onnx runtime error: {0}")]
    Runtime(#[from] ort::Error),
    #[cfg(feature = "onnx")]
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A word's sub-range could not be mapped to geometry. Absorbed by the
/// segmenter, which falls back to a zero rectangle for that word.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubrangeError {
    #[error("empty range {0:?}")]
    Empty(Range<usize>),
    #[error("range {range:?} exceeds text length {len}")]
    OutOfBounds { range: Range<usize>, len: usize },
    #[error("range {0:?} does not fall on character boundaries")]
    NotCharBoundary(Range<usize>),
    #[error("no candidate with rank {0}")]
    UnknownCandidate(usize),
    #[error("no geometry for range {0:?}")]
    Unresolved(Range<usize>),
}

/// The single failure a recognition call can reject with.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("recognition worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
