use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::{CamError, Result};
use crate::network::catalog::BLOCK_COUNT;

/// Describes one stage of MBConv blocks, before width scaling.
///
/// Fields:
/// - `kernel_size`: depthwise kernel side (3 or 5)
/// - `repeats`: number of blocks in the stage
/// - `filters_in`: channels entering the first block of the stage
/// - `filters_out`: channels leaving every block of the stage
/// - `expand_ratio`: expansion factor of the inverted bottleneck
/// - `stride`: stride of the first block (later blocks use 1)
/// - `se_ratio`: squeeze-and-excitation width relative to `filters_in`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub kernel_size: usize,
    pub repeats: usize,
    pub filters_in: usize,
    pub filters_out: usize,
    pub expand_ratio: usize,
    pub stride: usize,
    pub se_ratio: f32,
}

/// Fixed input normalization applied after scaling pixels to [0, 1]:
/// `(x - mean) / std` per RGB channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessing {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// ImageNet RGB channel means on the [0, 1] scale.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet RGB channel standard deviations on the [0, 1] scale.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

impl Preprocessing {
    pub fn imagenet() -> Preprocessing {
        Preprocessing { mean: IMAGENET_MEAN, std: IMAGENET_STD }
    }

    /// Folds the Keras EfficientNet input stem into one transform.
    ///
    /// Keras applies `Normalization(mean, variance)` and then a fixed
    /// `Rescaling(1 / sqrt(IMAGENET_STD))`, because the released checkpoint
    /// stores the standard deviations in the variance slot. The combined
    /// divisor is `sqrt(variance) * sqrt(IMAGENET_STD)`, which for the
    /// released weights is exactly `IMAGENET_STD`.
    pub fn from_keras_normalization(mean: &[f32], variance: &[f32]) -> Preprocessing {
        let std = |c: usize| variance[c].sqrt() * IMAGENET_STD[c].sqrt();
        Preprocessing {
            mean: [mean[0], mean[1], mean[2]],
            std: [std(0), std(1), std(2)],
        }
    }
}

/// A fully serializable description of an EfficientNet-style classifier.
///
/// `NetworkSpec` carries everything needed to build the layer graph; the
/// weights themselves come from a `ParamSource`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable architecture name.
    pub name: String,
    /// Side of the square network input.
    pub image_size: usize,
    /// Size of the class vocabulary.
    pub num_classes: usize,
    /// Channel multiplier applied through `round_filters`.
    pub width_coefficient: f32,
    pub bn_epsilon: f32,
    pub stem_filters: usize,
    pub top_filters: usize,
    /// Ordered stage descriptions (stem → top).
    pub blocks: Vec<BlockSpec>,
    pub preprocessing: Preprocessing,
}

/// One MBConv block after width scaling and stage expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockConfig {
    /// Keras-style prefix, e.g. `block4b_`.
    pub name: String,
    pub kernel_size: usize,
    pub stride: usize,
    pub filters_in: usize,
    pub filters_out: usize,
    pub expand_ratio: usize,
    pub se_filters: usize,
}

impl BlockConfig {
    pub fn expanded_filters(&self) -> usize {
        self.filters_in * self.expand_ratio
    }

    pub fn has_residual(&self) -> bool {
        self.stride == 1 && self.filters_in == self.filters_out
    }
}

fn stage(kernel_size: usize, repeats: usize, filters_in: usize, filters_out: usize, expand_ratio: usize, stride: usize) -> BlockSpec {
    BlockSpec { kernel_size, repeats, filters_in, filters_out, expand_ratio, stride, se_ratio: 0.25 }
}

impl NetworkSpec {
    /// EfficientNet-B0 with the ImageNet head.
    pub fn efficientnet_b0() -> NetworkSpec {
        NetworkSpec {
            name: "efficientnet-b0".to_owned(),
            image_size: 224,
            num_classes: 1000,
            width_coefficient: 1.0,
            bn_epsilon: 1e-3,
            stem_filters: 32,
            top_filters: 1280,
            blocks: vec![
                stage(3, 1, 32, 16, 1, 1),
                stage(3, 2, 16, 24, 6, 2),
                stage(5, 2, 24, 40, 6, 2),
                stage(3, 3, 40, 80, 6, 2),
                stage(5, 3, 80, 112, 6, 1),
                stage(5, 4, 112, 192, 6, 2),
                stage(3, 1, 192, 320, 6, 1),
            ],
            preprocessing: Preprocessing::imagenet(),
        }
    }

    /// The B0 block topology at a quarter of the width, a 64×64 input and a
    /// ten-class head. Every layer of the catalog exists, so it is a cheap
    /// stand-in for the full network.
    pub fn tiny() -> NetworkSpec {
        NetworkSpec {
            name: "efficientnet-b0-tiny".to_owned(),
            image_size: 64,
            num_classes: 10,
            width_coefficient: 0.25,
            ..NetworkSpec::efficientnet_b0()
        }
    }

    /// EfficientNet channel rounding: scale, snap to a multiple of 8, and
    /// never fall more than 10% below the scaled value.
    pub fn round_filters(&self, filters: usize) -> usize {
        let divisor = 8usize;
        let scaled = filters as f32 * self.width_coefficient;
        let snapped = ((scaled + divisor as f32 / 2.0) as usize / divisor) * divisor;
        let mut rounded = snapped.max(divisor);
        if (rounded as f32) < 0.9 * scaled {
            rounded += divisor;
        }
        rounded
    }

    pub fn stem_channels(&self) -> usize {
        self.round_filters(self.stem_filters)
    }

    pub fn top_channels(&self) -> usize {
        self.round_filters(self.top_filters)
    }

    /// Expands the stage list into one `BlockConfig` per block, in depth order.
    pub fn block_configs(&self) -> Vec<BlockConfig> {
        let mut configs = Vec::new();
        for (stage_idx, spec) in self.blocks.iter().enumerate() {
            let filters_out = self.round_filters(spec.filters_out);
            let mut filters_in = self.round_filters(spec.filters_in);
            for j in 0..spec.repeats {
                let letter = (b'a' + j as u8) as char;
                configs.push(BlockConfig {
                    name: format!("block{}{}_", stage_idx + 1, letter),
                    kernel_size: spec.kernel_size,
                    stride: if j == 0 { spec.stride } else { 1 },
                    filters_in,
                    filters_out,
                    expand_ratio: spec.expand_ratio,
                    se_filters: ((filters_in as f32 * spec.se_ratio) as usize).max(1),
                });
                filters_in = filters_out;
            }
        }
        configs
    }

    /// Rejects specs that the layer catalog or the heatmap pipeline cannot serve.
    pub fn validate(&self) -> Result<()> {
        let total: usize = self.blocks.iter().map(|b| b.repeats).sum();
        if total != BLOCK_COUNT {
            return Err(CamError::Config(format!(
                "network has {} blocks but the layer catalog needs {}",
                total, BLOCK_COUNT
            )));
        }
        if self.image_size < 32 {
            return Err(CamError::Config(format!("image_size {} is below 32", self.image_size)));
        }
        if self.num_classes == 0 {
            return Err(CamError::Config("num_classes must be greater than 0".into()));
        }
        if self.width_coefficient <= 0.0 {
            return Err(CamError::Config("width_coefficient must be positive".into()));
        }
        if self.preprocessing.std.iter().any(|s| *s <= 0.0) {
            return Err(CamError::Config("preprocessing std must be positive".into()));
        }
        Ok(())
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|source| CamError::Io { path: path.to_owned(), source })?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| CamError::Config(e.to_string()))
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json(path: &Path) -> Result<NetworkSpec> {
        let file = std::fs::File::open(path)
            .map_err(|source| CamError::Io { path: path.to_owned(), source })?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| CamError::Config(e.to_string()))
    }
}

impl Default for NetworkSpec {
    fn default() -> Self {
        NetworkSpec::efficientnet_b0()
    }
}
