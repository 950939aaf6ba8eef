use crate::math::matrix::Matrix;

/// Fully connected classifier layer producing raw class logits.
#[derive(Debug, Clone)]
pub struct Dense {
    pub size: usize,
    pub weights: Matrix, // (input_size, size), Keras layout
    pub biases: Vec<f32>,
}

impl Dense {
    pub fn new(weights: Matrix, biases: Vec<f32>) -> Dense {
        assert_eq!(biases.len(), weights.cols, "one bias per output neuron required");
        Dense { size: weights.cols, weights, biases }
    }

    /// z = xW + b
    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut z = self.weights.left_mul(input);
        for (v, b) in z.iter_mut().zip(&self.biases) {
            *v += b;
        }
        z
    }

    /// Propagates ∂L/∂z back to ∂L/∂x through the weights.
    pub fn backward_input(&self, delta: &[f32]) -> Vec<f32> {
        self.weights.left_mul_transposed(delta)
    }
}
