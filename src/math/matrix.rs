use rand::prelude::*;
use serde::{Serialize, Deserialize};
use std::f32::consts::PI;

/// Row-major dense matrix. Shape is (rows, cols); element (i, j) lives at
/// `data[i * cols + j]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    /// Wraps an existing buffer. Panics when the length does not match the shape.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Matrix {
        assert_eq!(data.len(), rows * cols, "Matrix data does not match {}x{}", rows, cols);
        Matrix { rows, cols, data }
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    /// Both u1 and u2 must be uniform on (0, 1].
    fn sample_standard_normal<R: Rng>(rng: &mut R) -> f32 {
        // Draw two independent uniform samples in (0, 1] to avoid log(0).
        let u1: f32 = 1.0 - rng.gen::<f32>();
        let u2: f32 = 1.0 - rng.gen::<f32>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// Xavier (Glorot) initialization: samples from N(0, sqrt(1 / fan_in)).
    ///
    /// Shape: (rows, cols). `fan_in` is passed explicitly because convolution
    /// kernels flatten their receptive field into the row dimension.
    pub fn xavier<R: Rng>(rows: usize, cols: usize, fan_in: usize, rng: &mut R) -> Matrix {
        let std_dev = (1.0 / fan_in.max(1) as f32).sqrt();
        let data = (0..rows * cols)
            .map(|_| Matrix::sample_standard_normal(rng) * std_dev)
            .collect();
        Matrix { rows, cols, data }
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Row vector times matrix: `x · W`, with `x.len() == rows`.
    pub fn left_mul(&self, x: &[f32]) -> Vec<f32> {
        assert_eq!(x.len(), self.rows, "Matrices are of incorrect sizes");
        let mut out = vec![0.0; self.cols];
        for (i, &xi) in x.iter().enumerate() {
            if xi == 0.0 {
                continue;
            }
            for (o, &w) in out.iter_mut().zip(self.row(i)) {
                *o += xi * w;
            }
        }
        out
    }

    /// Row vector times the transpose: `g · Wᵀ`, with `g.len() == cols`.
    /// This is the input gradient of `left_mul`.
    pub fn left_mul_transposed(&self, g: &[f32]) -> Vec<f32> {
        assert_eq!(g.len(), self.cols, "Matrices are of incorrect sizes");
        (0..self.rows)
            .map(|i| self.row(i).iter().zip(g).map(|(w, gj)| w * gj).sum())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rstest::rstest;

    #[rstest]
    fn left_mul_matches_manual_product() {
        let w = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(w.left_mul(&[1.0, -1.0]), vec![-3.0, -3.0, -3.0]);
    }

    #[rstest]
    fn transposed_product_matches_manual_product() {
        let w = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let g = [0.5, -1.0, 2.0];
        // (0.5 - 2 + 6, 2 - 5 + 12)
        assert_eq!(w.left_mul_transposed(&g), vec![4.5, 9.0]);
    }

    #[rstest]
    fn xavier_is_reproducible_for_a_seed() {
        let a = Matrix::xavier(4, 4, 4, &mut StdRng::seed_from_u64(7));
        let b = Matrix::xavier(4, 4, 4, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
