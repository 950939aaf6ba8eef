use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading the network or serving a Grad-CAM request.
#[derive(Debug, Error)]
pub enum CamError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse safetensors archive: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),
    #[error("weights archive has no tensor named \"{name}\"")]
    MissingTensor { name: String },
    #[error("tensor \"{name}\" has dtype {dtype}; only F32 is supported")]
    UnsupportedDtype { name: String, dtype: String },
    #[error("tensor \"{name}\" has shape {actual:?} but expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("failed to parse label vocabulary: {0}")]
    Labels(#[source] serde_json::Error),
    #[error("label vocabulary has {actual} classes but the network predicts {expected}")]
    LabelCount { expected: usize, actual: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("layer index {index} is outside the catalog 0..={max}")]
    LayerOutOfRange { index: usize, max: usize },
    #[error("class rank {rank} is outside the top-5 table 0..={max}")]
    RankOutOfRange { rank: usize, max: usize },
    #[error("class rank {rank} requested but the network only has {classes} classes")]
    RankUnavailable { rank: usize, classes: usize },
}

pub type Result<T> = std::result::Result<T, CamError>;
