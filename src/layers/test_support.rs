//! Finite-difference helpers shared by the layer tests.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::math::tensor::Tensor;

pub fn seeded_tensor(height: usize, width: usize, channels: usize, seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..height * width * channels).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Tensor::from_vec(height, width, channels, data)
}

fn dot(a: &Tensor, b: &Tensor) -> f64 {
    a.data.iter().zip(&b.data).map(|(x, y)| *x as f64 * *y as f64).sum()
}

/// Checks `backward` against a central difference of `forward` along a random
/// direction, contracted with a random upstream gradient.
pub fn directional_check<F, B>(x: &Tensor, forward: F, backward: B)
where
    F: Fn(&Tensor) -> Tensor,
    B: Fn(&Tensor) -> Tensor,
{
    let eps = 1e-2f32;
    let out = forward(x);
    let upstream = seeded_tensor(out.height, out.width, out.channels, 101);
    let direction = seeded_tensor(x.height, x.width, x.channels, 202);

    let plus = forward(&x.zip_map(&direction, |a, d| a + eps * d));
    let minus = forward(&x.zip_map(&direction, |a, d| a - eps * d));
    let numeric = (dot(&upstream, &plus) - dot(&upstream, &minus)) / (2.0 * eps as f64);

    let grad_in = backward(&upstream);
    assert_eq!(grad_in.shape(), x.shape(), "input gradient has the wrong shape");
    let analytic = dot(&grad_in, &direction);

    let tolerance = 1e-3 + 1e-2 * numeric.abs().max(analytic.abs());
    assert!(
        (numeric - analytic).abs() <= tolerance,
        "numeric {} vs analytic {}",
        numeric, analytic
    );
}
