use serde::Serialize;
use tracing::warn;

use crate::activation::ActivationFunction;
use crate::math::tensor::Tensor;

/// Single-channel saliency map at the tapped layer's resolution, row-major,
/// every value in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl Heatmap {
    pub fn zeros(width: usize, height: usize) -> Heatmap {
        Heatmap { width, height, values: vec![0.0; width * height] }
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// True when no location carries any evidence for the class.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }
}

/// Collapses an activation and its gradient into a Grad-CAM map.
///
/// Channel weights are the spatial mean of the gradient; the weighted
/// channel sum is rectified and divided by its maximum. A map with no
/// positive (or no finite) maximum comes back as all zeros.
pub fn synthesize(activation: &Tensor, gradient: &Tensor) -> Heatmap {
    assert_eq!(activation.shape(), gradient.shape(), "activation and gradient shapes differ");
    let weights = gradient.global_average_pool();
    let mut values = ActivationFunction::ReLU.apply_vec(&activation.weighted_channel_sum(&weights));

    let max = values.iter().copied().fold(0.0f32, f32::max);
    if !(max > 0.0 && max.is_finite()) {
        warn!(
            width = activation.width,
            height = activation.height,
            max,
            "degenerate heatmap, emitting an all-zero map"
        );
        return Heatmap::zeros(activation.width, activation.height);
    }
    for v in &mut values {
        *v /= max;
    }
    Heatmap { width: activation.width, height: activation.height, values }
}
