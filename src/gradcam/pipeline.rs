use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::gradcam::composite::Compositor;
use crate::gradcam::extract::extract;
use crate::gradcam::predict::{top_predictions, Prediction};
use crate::gradcam::preprocess::{decode_image, prepare, PreparedImage};
use crate::gradcam::selection::{ClassSelection, LayerIndex};
use crate::gradcam::synthesize::{synthesize, Heatmap};
use crate::network::catalog::{LayerEntry, LAYER_CATALOG};
use crate::network::{EfficientNet, Labels, NetworkSpec, ScoreTarget};

/// Grad-CAM engine.
///
/// Holds the network and vocabulary behind `Arc`s; clones are cheap and
/// share them, so one engine serves every request thread.
#[derive(Debug, Clone)]
pub struct GradCam {
    network: Arc<EfficientNet>,
    labels: Arc<Labels>,
    compositor: Compositor,
    target: ScoreTarget,
}

/// Everything one Grad-CAM request produces.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub predictions: Vec<Prediction>,
    pub class_index: usize,
    pub label: String,
    pub layer: &'static LayerEntry,
    pub heatmap: Heatmap,
    /// The image the network saw, at network resolution.
    pub input: RgbImage,
    /// `input` with the colored heatmap blended over it.
    pub overlay: RgbImage,
}

impl GradCam {
    pub fn new(network: EfficientNet, labels: Labels) -> Result<GradCam> {
        labels.ensure_matches(network.num_classes())?;
        Ok(GradCam {
            network: Arc::new(network),
            labels: Arc::new(labels),
            compositor: Compositor::default(),
            target: ScoreTarget::default(),
        })
    }

    /// Loads weights and labels named by `config`.
    pub fn from_config(config: &EngineConfig) -> Result<GradCam> {
        config.validate()?;
        let network = EfficientNet::from_safetensors(config.network.clone(), &config.weights)?;
        let labels = Labels::load(&config.labels)?;
        Ok(GradCam::new(network, labels)?
            .with_compositor(Compositor::new(config.alpha)?)
            .with_score_target(config.score_target))
    }

    /// Seeded random network with placeholder labels `class_<n>`. Heatmaps
    /// are meaningless but every code path runs without a weights download.
    pub fn random(spec: NetworkSpec, seed: u64) -> Result<GradCam> {
        let labels = Labels::from_names((0..spec.num_classes).map(|i| format!("class_{}", i)));
        GradCam::new(EfficientNet::random(spec, seed)?, labels)
    }

    pub fn with_compositor(mut self, compositor: Compositor) -> GradCam {
        self.compositor = compositor;
        self
    }

    pub fn with_score_target(mut self, target: ScoreTarget) -> GradCam {
        self.target = target;
        self
    }

    pub fn network(&self) -> &EfficientNet {
        &self.network
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// The selectable layers, shallow to deep.
    pub fn layers(&self) -> &'static [LayerEntry] {
        &LAYER_CATALOG
    }

    pub fn prepare(&self, image: &DynamicImage) -> PreparedImage {
        let spec = self.network.spec();
        prepare(image, spec.image_size as u32, &spec.preprocessing)
    }

    /// Top-5 table for `image`.
    pub fn predict(&self, image: &DynamicImage) -> Vec<Prediction> {
        self.predict_prepared(&self.prepare(image))
    }

    pub fn predict_prepared(&self, prepared: &PreparedImage) -> Vec<Prediction> {
        let started = Instant::now();
        let predictions = top_predictions(&self.network.scores(&prepared.input), &self.labels);
        debug!(elapsed = ?started.elapsed(), "prediction");
        predictions
    }

    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Vec<Prediction>> {
        Ok(self.predict(&decode_image(bytes)?))
    }

    /// Full request: prediction table, class resolution, Grad-CAM map and
    /// overlay, all from the same prepared input.
    pub fn explain(&self, image: &DynamicImage, layer: LayerIndex, selection: ClassSelection) -> Result<Explanation> {
        self.explain_prepared(self.prepare(image), layer, selection)
    }

    pub fn explain_prepared(
        &self,
        prepared: PreparedImage,
        layer: LayerIndex,
        selection: ClassSelection,
    ) -> Result<Explanation> {
        let started = Instant::now();
        let extraction = extract(&self.network, &prepared.input, layer, selection, self.target)?;
        let predictions = top_predictions(&extraction.scores, &self.labels);

        let heatmap = synthesize(&extraction.activation, &extraction.gradient);
        let overlay = self.compositor.composite(&prepared.rgb, &heatmap);
        debug!(
            layer = %layer,
            class_index = extraction.class_index,
            heatmap_width = heatmap.width,
            heatmap_height = heatmap.height,
            elapsed = ?started.elapsed(),
            "explanation"
        );

        Ok(Explanation {
            predictions,
            class_index: extraction.class_index,
            label: self.labels.display(extraction.class_index),
            layer: layer.entry(),
            heatmap,
            input: prepared.rgb,
            overlay,
        })
    }

    pub fn explain_bytes(&self, bytes: &[u8], layer: LayerIndex, selection: ClassSelection) -> Result<Explanation> {
        self.explain(&decode_image(bytes)?, layer, selection)
    }
}
