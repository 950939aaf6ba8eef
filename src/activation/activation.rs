use serde::{Serialize, Deserialize};
use std::f32::consts::E;

use crate::math::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Identity,
    ReLU,
    Sigmoid,
    /// x · σ(x), the EfficientNet activation.
    Swish,
}

impl ActivationFunction {
    pub fn function(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::Identity => x,
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Sigmoid => sigmoid(x),
            ActivationFunction::Swish => x * sigmoid(x),
        }
    }

    /// Element-wise derivative of the activation, evaluated at the
    /// pre-activation value `x`.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::Identity => 1.0,
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Sigmoid => {
                let fx = sigmoid(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::Swish => {
                let sig = sigmoid(x);
                sig + x * sig * (1.0 - sig)
            }
        }
    }

    pub fn apply(&self, z: &Tensor) -> Tensor {
        z.map(|x| self.function(x))
    }

    pub fn apply_vec(&self, z: &[f32]) -> Vec<f32> {
        z.iter().map(|&x| self.function(x)).collect()
    }

    /// Chain rule through the activation: `grad ⊙ f'(z)`.
    pub fn backward(&self, z: &Tensor, grad: &Tensor) -> Tensor {
        grad.zip_map(z, |g, x| g * self.derivative(x))
    }

    pub fn backward_vec(&self, z: &[f32], grad: &[f32]) -> Vec<f32> {
        grad.iter().zip(z).map(|(g, &x)| g * self.derivative(x)).collect()
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + E.powf(-x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ActivationFunction::Identity)]
    #[case(ActivationFunction::Sigmoid)]
    #[case(ActivationFunction::Swish)]
    fn derivative_matches_central_difference(#[case] act: ActivationFunction) {
        let h = 1e-3;
        for &x in &[-3.0f32, -0.5, 0.25, 2.0] {
            let numeric = (act.function(x + h) - act.function(x - h)) / (2.0 * h);
            assert!(
                (numeric - act.derivative(x)).abs() < 1e-3,
                "{:?} at {}: numeric {} vs analytic {}",
                act, x, numeric, act.derivative(x)
            );
        }
    }

    #[rstest]
    fn relu_rectifies() {
        let act = ActivationFunction::ReLU;
        assert_eq!(act.apply_vec(&[-1.0, 0.0, 2.5]), vec![0.0, 0.0, 2.5]);
    }
}
