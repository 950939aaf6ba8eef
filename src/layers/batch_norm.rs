use crate::math::tensor::Tensor;

/// Inference-mode batch normalization folded into one affine map per
/// channel: `y = x * scale + shift`.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    pub scale: Vec<f32>,
    pub shift: Vec<f32>,
}

impl BatchNorm {
    /// Folds the moving statistics:
    /// `scale = γ / sqrt(var + ε)`, `shift = β - mean * scale`.
    pub fn from_stats(gamma: &[f32], beta: &[f32], mean: &[f32], variance: &[f32], epsilon: f32) -> BatchNorm {
        let scale: Vec<f32> = gamma.iter().zip(variance)
            .map(|(g, v)| g / (v + epsilon).sqrt())
            .collect();
        let shift = beta.iter().zip(mean).zip(&scale)
            .map(|((b, m), s)| b - m * s)
            .collect();
        BatchNorm { scale, shift }
    }

    pub fn channels(&self) -> usize {
        self.scale.len()
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        assert_eq!(input.channels, self.channels(), "BatchNorm channel mismatch");
        let mut out = input.clone();
        for px in out.data.chunks_mut(input.channels) {
            for ((v, s), b) in px.iter_mut().zip(&self.scale).zip(&self.shift) {
                *v = *v * s + b;
            }
        }
        out
    }

    pub fn backward_input(&self, grad_out: &Tensor) -> Tensor {
        grad_out.scale_channels(&self.scale)
    }
}
