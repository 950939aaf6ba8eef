use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CamError, Result};
use crate::gradcam::composite::DEFAULT_ALPHA;
use crate::network::{NetworkSpec, ScoreTarget};

/// Everything needed to stand up a `GradCam` engine.
///
/// ```json
/// {
///   "weights": "weights/efficientnet_b0.safetensors",
///   "labels": "weights/imagenet_class_index.json",
///   "alpha": 0.4,
///   "score_target": "probability"
/// }
/// ```
///
/// `network` defaults to EfficientNet-B0 when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub weights: PathBuf,
    pub labels: PathBuf,
    #[serde(default)]
    pub network: NetworkSpec,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    #[serde(default)]
    pub score_target: ScoreTarget,
}

fn default_alpha() -> f32 {
    DEFAULT_ALPHA
}

impl EngineConfig {
    pub fn new(weights: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> EngineConfig {
        EngineConfig {
            weights: weights.into(),
            labels: labels.into(),
            network: NetworkSpec::default(),
            alpha: DEFAULT_ALPHA,
            score_target: ScoreTarget::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(CamError::Config(format!("alpha must lie in (0, 1], got {}", self.alpha)));
        }
        for (what, path) in [("weights", &self.weights), ("labels", &self.labels)] {
            if !path.is_file() {
                return Err(CamError::Config(format!("{} file {} does not exist", what, path.display())));
            }
        }
        self.network.validate()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|source| CamError::Io { path: path.to_owned(), source })?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| CamError::Config(e.to_string()))
    }

    pub fn load_json(path: &Path) -> Result<EngineConfig> {
        let file = std::fs::File::open(path)
            .map_err(|source| CamError::Io { path: path.to_owned(), source })?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| CamError::Config(format!("{}: {}", path.display(), e)))
    }
}
