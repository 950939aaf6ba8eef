use std::path::Path;

use tracing::info;

use crate::activation::ActivationFunction;
use crate::error::{CamError, Result};
use crate::layers::{BatchNorm, Conv2d, Dense};
use crate::math::tensor::Tensor;
use crate::network::block::{BlockTrace, MbConvBlock};
use crate::network::catalog::{LayerEntry, TapPoint, LAYER_CATALOG};
use crate::network::scores::ClassScores;
use crate::network::spec::{NetworkSpec, Preprocessing};
use crate::network::weights::{
    load_batch_norm, load_conv, load_dense, ParamSource, RandomSource, SafeTensorsSource,
};

const SWISH: ActivationFunction = ActivationFunction::Swish;

/// EfficientNet classifier with frozen weights.
///
/// Nothing here mutates the network: every forward pass returns its own
/// intermediates, so one instance can be shared behind an `Arc` by any number
/// of concurrent requests.
#[derive(Debug, Clone)]
pub struct EfficientNet {
    spec: NetworkSpec,
    stem_conv: Conv2d,
    stem_bn: BatchNorm,
    blocks: Vec<MbConvBlock>,
    top_conv: Conv2d,
    top_bn: BatchNorm,
    classifier: Dense,
}

#[derive(Debug, Clone)]
struct TopTrace {
    in_height: usize,
    in_width: usize,
    pre: Tensor,
}

/// Everything downstream of a tapped layer that backprop needs.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    first_block: usize,
    blocks: Vec<BlockTrace>,
    top: Option<TopTrace>,
    pooled_height: usize,
    pooled_width: usize,
}

/// Result of a forward pass that exposes one catalog layer.
#[derive(Debug, Clone)]
pub struct TappedForward {
    pub activation: Tensor,
    pub scores: ClassScores,
    pub trace: ForwardTrace,
}

impl EfficientNet {
    /// Builds the layer graph of `spec`, pulling every parameter from `src`.
    pub fn build(mut spec: NetworkSpec, src: &mut dyn ParamSource) -> Result<EfficientNet> {
        spec.validate()?;
        let eps = spec.bn_epsilon;
        let stem = spec.stem_channels();
        let top = spec.top_channels();

        if let Some(mean) = src.optional("normalization/mean", &[3])? {
            let variance = src.tensor("normalization/variance", &[3])?;
            spec.preprocessing = Preprocessing::from_keras_normalization(&mean, &variance);
        }

        let stem_conv = load_conv(src, "stem_conv", 3, 2, 3, stem, false)?;
        let stem_bn = load_batch_norm(src, "stem_bn", stem, eps)?;

        let mut blocks = Vec::new();
        let mut channels = stem;
        for config in spec.block_configs() {
            channels = config.filters_out;
            blocks.push(MbConvBlock::load(src, config, eps)?);
        }

        let top_conv = load_conv(src, "top_conv", 1, 1, channels, top, false)?;
        let top_bn = load_batch_norm(src, "top_bn", top, eps)?;
        let classifier = load_dense(src, "predictions", top, spec.num_classes)?;

        Ok(EfficientNet { spec, stem_conv, stem_bn, blocks, top_conv, top_bn, classifier })
    }

    /// Loads pretrained weights from a safetensors archive.
    pub fn from_safetensors(spec: NetworkSpec, path: &Path) -> Result<EfficientNet> {
        let mut src = SafeTensorsSource::open(path)?;
        let net = EfficientNet::build(spec, &mut src)?;
        if !src.is_empty() {
            info!(unused = src.len(), "weights archive has tensors the network does not use");
        }
        info!(name = %net.spec.name, classes = net.num_classes(), "network ready");
        Ok(net)
    }

    /// Deterministic randomly-initialised network.
    pub fn random(spec: NetworkSpec, seed: u64) -> Result<EfficientNet> {
        EfficientNet::build(spec, &mut RandomSource::new(seed))
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.size
    }

    pub fn image_size(&self) -> usize {
        self.spec.image_size
    }

    fn stem(&self, input: &Tensor) -> Tensor {
        SWISH.apply(&self.stem_bn.forward(&self.stem_conv.forward(input)))
    }

    fn head(&self, features: &Tensor) -> ClassScores {
        let pooled = features.global_average_pool();
        ClassScores::from_logits(self.classifier.forward(&pooled))
    }

    /// Plain forward pass to class scores.
    pub fn scores(&self, input: &Tensor) -> ClassScores {
        let mut x = self.stem(input);
        for block in &self.blocks {
            x = block.forward(&x);
        }
        let top = SWISH.apply(&self.top_bn.forward(&self.top_conv.forward(&x)));
        self.head(&top)
    }

    /// Resumes the forward pass from an activation captured at `layer`.
    pub fn scores_from(&self, layer: &LayerEntry, activation: &Tensor) -> ClassScores {
        let features = match layer.tap_point() {
            TapPoint::Top => activation.clone(),
            tap => {
                let first_block = match tap {
                    TapPoint::Block(b) => b + 1,
                    _ => 0,
                };
                let mut x = activation.clone();
                for block in self.blocks.iter().skip(first_block) {
                    x = block.forward(&x);
                }
                SWISH.apply(&self.top_bn.forward(&self.top_conv.forward(&x)))
            }
        };
        self.head(&features)
    }

    /// Forward pass that returns the activation at `layer` together with the
    /// class scores and a trace of every operation after `layer`.
    pub fn forward_tapped(&self, input: &Tensor, layer: &LayerEntry) -> Result<TappedForward> {
        let out_of_range = || CamError::LayerOutOfRange { index: layer.index, max: LAYER_CATALOG.len() - 1 };
        let tap = layer.tap_point();
        let first_block = match tap {
            TapPoint::Stem => 0,
            TapPoint::Block(b) if b < self.blocks.len() => b + 1,
            TapPoint::Block(_) => return Err(out_of_range()),
            TapPoint::Top => self.blocks.len(),
        };

        let mut x = self.stem(input);
        let mut activation = (tap == TapPoint::Stem).then(|| x.clone());

        let mut traces = Vec::with_capacity(self.blocks.len() - first_block);
        for (i, block) in self.blocks.iter().enumerate() {
            if i < first_block {
                x = block.forward(&x);
            } else {
                let (y, trace) = block.forward_traced(&x);
                traces.push(trace);
                x = y;
            }
            if tap == TapPoint::Block(i) {
                activation = Some(x.clone());
            }
        }

        let top_pre = self.top_bn.forward(&self.top_conv.forward(&x));
        let features = SWISH.apply(&top_pre);
        let top_trace = if tap == TapPoint::Top {
            activation = Some(features.clone());
            None
        } else {
            Some(TopTrace { in_height: x.height, in_width: x.width, pre: top_pre })
        };

        let scores = self.head(&features);
        let activation = activation.ok_or_else(out_of_range)?;
        Ok(TappedForward {
            activation,
            scores,
            trace: ForwardTrace {
                first_block,
                blocks: traces,
                top: top_trace,
                pooled_height: features.height,
                pooled_width: features.width,
            },
        })
    }

    /// Reverse-mode pass from the logits back to the tapped activation.
    ///
    /// `grad_logits` is ∂score/∂logits; the result is ∂score/∂activation with
    /// the activation's shape.
    pub fn backward_to_tap(&self, trace: &ForwardTrace, grad_logits: &[f32]) -> Tensor {
        let grad_pooled = self.classifier.backward_input(grad_logits);
        let mut grad = Tensor::broadcast_pool_grad(&grad_pooled, trace.pooled_height, trace.pooled_width);

        if let Some(top) = &trace.top {
            let grad_pre = SWISH.backward(&top.pre, &grad);
            grad = self.top_conv.backward_input(&self.top_bn.backward_input(&grad_pre), top.in_height, top.in_width);
        }

        for (block, block_trace) in self.blocks[trace.first_block..].iter().zip(&trace.blocks).rev() {
            grad = block.backward_input(block_trace, &grad);
        }
        grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::test_support::seeded_tensor;
    use crate::network::scores::ScoreTarget;
    use crate::network::spec::{IMAGENET_MEAN, IMAGENET_STD};
    use crate::network::weights::{serialize_archive, RecordingSource};
    use rstest::{fixture, rstest};

    #[rstest]
    fn keras_archive_loads_with_imagenet_input_scaling() {
        let mut recorder = RecordingSource::new(42);
        let reference = EfficientNet::build(NetworkSpec::tiny(), &mut recorder).expect("record");
        let mut entries = recorder.into_tensors();
        // The released Keras checkpoint stores the std values as the variance.
        entries.push(("normalization/mean".to_owned(), vec![3], IMAGENET_MEAN.to_vec()));
        entries.push(("normalization/variance".to_owned(), vec![3], IMAGENET_STD.to_vec()));

        let bytes = serialize_archive(&entries);
        let mut src = SafeTensorsSource::from_bytes(&bytes).expect("parse");
        let loaded = EfficientNet::build(NetworkSpec::tiny(), &mut src).expect("build");
        assert!(src.is_empty(), "{} tensors left unused", src.len());

        let preprocessing = &loaded.spec().preprocessing;
        assert_eq!(preprocessing.mean, IMAGENET_MEAN);
        for (got, want) in preprocessing.std.iter().zip(IMAGENET_STD) {
            assert!((got - want).abs() < 1e-6, "effective std {} != {}", got, want);
        }

        let x = seeded_tensor(64, 64, 3, 9);
        assert_eq!(loaded.scores(&x), reference.scores(&x));
    }

    #[rstest]
    fn archives_without_normalization_keep_the_spec_preprocessing() {
        let mut recorder = RecordingSource::new(5);
        EfficientNet::build(NetworkSpec::tiny(), &mut recorder).expect("record");
        let bytes = serialize_archive(&recorder.into_tensors());
        let mut src = SafeTensorsSource::from_bytes(&bytes).expect("parse");
        let loaded = EfficientNet::build(NetworkSpec::tiny(), &mut src).expect("build");
        assert_eq!(loaded.spec().preprocessing, NetworkSpec::tiny().preprocessing);
    }

    #[fixture]
    fn tiny() -> EfficientNet {
        EfficientNet::random(NetworkSpec::tiny(), 42).expect("tiny network")
    }

    #[rstest]
    #[case(0, (32, 32, 8))]
    #[case(1, (32, 32, 8))]
    #[case(3, (16, 16, 8))]
    #[case(8, (4, 4, 24))]
    #[case(15, (2, 2, 48))]
    #[case(17, (2, 2, 320))]
    fn tapped_activation_shapes(tiny: EfficientNet, #[case] index: usize, #[case] shape: (usize, usize, usize)) {
        let x = seeded_tensor(64, 64, 3, 1);
        let tapped = tiny.forward_tapped(&x, &LAYER_CATALOG[index]).expect("forward");
        assert_eq!(tapped.activation.shape(), shape);
    }

    #[rstest]
    fn tapping_does_not_change_the_scores(tiny: EfficientNet) {
        let x = seeded_tensor(64, 64, 3, 2);
        let plain = tiny.scores(&x);
        for layer in [0, 9, 17] {
            let tapped = tiny.forward_tapped(&x, &LAYER_CATALOG[layer]).expect("forward");
            assert_eq!(tapped.scores, plain);
        }
    }

    #[rstest]
    #[case(0)]
    #[case(7)]
    #[case(17)]
    fn gradient_matches_finite_differences(tiny: EfficientNet, #[case] index: usize) {
        let x = seeded_tensor(64, 64, 3, 3);
        let layer = &LAYER_CATALOG[index];
        let tapped = tiny.forward_tapped(&x, layer).expect("forward");
        let class = tapped.scores.argmax();
        let grad = tiny.backward_to_tap(
            &tapped.trace,
            &tapped.scores.score_gradient(class, ScoreTarget::Logit),
        );
        assert_eq!(grad.shape(), tapped.activation.shape());

        // Re-run the rest of the network from a perturbed activation by
        // splicing it back in through a second tapped pass.
        let direction = seeded_tensor(grad.height, grad.width, grad.channels, 99);
        let eps = 1e-2f32;
        let logit_from = |act: &Tensor| -> f32 { tiny.scores_from(layer, act).logits[class] };
        let plus = logit_from(&tapped.activation.zip_map(&direction, |a, d| a + eps * d));
        let minus = logit_from(&tapped.activation.zip_map(&direction, |a, d| a - eps * d));
        let numeric = (plus - minus) / (2.0 * eps);
        let analytic: f32 = grad.data.iter().zip(&direction.data).map(|(g, d)| g * d).sum();
        let tolerance = 1e-3 + 2e-2 * numeric.abs().max(analytic.abs());
        assert!((numeric - analytic).abs() <= tolerance, "numeric {} vs analytic {}", numeric, analytic);
    }

    #[rstest]
    fn rejects_specs_without_the_catalog_blocks() {
        let mut spec = NetworkSpec::tiny();
        spec.blocks.pop();
        assert!(EfficientNet::random(spec, 1).is_err());
    }
}
