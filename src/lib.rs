pub mod error;
pub mod config;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod gradcam;

// Convenience re-exports
pub use error::{CamError, Result};
pub use config::EngineConfig;
pub use math::{Matrix, Tensor};
pub use activation::ActivationFunction;
pub use network::{EfficientNet, Labels, LayerEntry, NetworkSpec, ScoreTarget, LAYER_CATALOG};
pub use gradcam::{ClassSelection, Explanation, GradCam, Heatmap, LayerIndex, Prediction};
