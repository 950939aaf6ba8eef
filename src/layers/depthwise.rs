use crate::layers::padding::Padding;
use crate::math::tensor::Tensor;

/// Depthwise convolution (depth multiplier 1): each channel is filtered by
/// its own `kernel × kernel` window. `weights[(ky * kernel + kx) * C + c]`
/// is the Keras `(kh, kw, C, 1)` kernel flattened.
#[derive(Debug, Clone)]
pub struct DepthwiseConv2d {
    pub kernel_size: usize,
    pub stride: usize,
    pub channels: usize,
    pub weights: Vec<f32>,
}

impl DepthwiseConv2d {
    pub fn new(kernel_size: usize, stride: usize, channels: usize, weights: Vec<f32>) -> DepthwiseConv2d {
        assert_eq!(
            weights.len(),
            kernel_size * kernel_size * channels,
            "depthwise kernel has the wrong length"
        );
        DepthwiseConv2d { kernel_size, stride, channels, weights }
    }

    fn tap(&self, ky: usize, kx: usize) -> &[f32] {
        let start = (ky * self.kernel_size + kx) * self.channels;
        &self.weights[start..start + self.channels]
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        assert_eq!(input.channels, self.channels, "depthwise input channel mismatch");
        let (h, w) = (input.height, input.width);
        let k = self.kernel_size;
        let pad = Padding::for_conv(h, w, k, self.stride);
        let (oh, ow) = pad.output_size(h, w, k, self.stride);
        let mut out = Tensor::zeros(oh, ow, self.channels);

        for oy in 0..oh {
            for ox in 0..ow {
                let start = out.index(oy, ox, 0);
                for ky in 0..k {
                    let Some(iy) = Padding::source(oy, ky, self.stride, pad.top, h) else { continue };
                    for kx in 0..k {
                        let Some(ix) = Padding::source(ox, kx, self.stride, pad.left, w) else { continue };
                        let px = input.pixel(iy, ix);
                        let acc = &mut out.data[start..start + self.channels];
                        for ((a, v), wt) in acc.iter_mut().zip(px).zip(self.tap(ky, kx)) {
                            *a += v * wt;
                        }
                    }
                }
            }
        }
        out
    }

    pub fn backward_input(&self, grad_out: &Tensor, in_height: usize, in_width: usize) -> Tensor {
        let k = self.kernel_size;
        let pad = Padding::for_conv(in_height, in_width, k, self.stride);
        let mut grad_in = Tensor::zeros(in_height, in_width, self.channels);

        for oy in 0..grad_out.height {
            for ox in 0..grad_out.width {
                let g = grad_out.pixel(oy, ox);
                for ky in 0..k {
                    let Some(iy) = Padding::source(oy, ky, self.stride, pad.top, in_height) else { continue };
                    for kx in 0..k {
                        let Some(ix) = Padding::source(ox, kx, self.stride, pad.left, in_width) else { continue };
                        let start = grad_in.index(iy, ix, 0);
                        let gi = &mut grad_in.data[start..start + self.channels];
                        for ((slot, gv), wt) in gi.iter_mut().zip(g).zip(self.tap(ky, kx)) {
                            *slot += gv * wt;
                        }
                    }
                }
            }
        }
        grad_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::test_support::{directional_check, seeded_tensor};
    use rstest::rstest;

    #[rstest]
    fn channels_do_not_mix() {
        let mut weights = vec![0.0; 9 * 2];
        // centre tap: channel 0 doubled, channel 1 zeroed
        weights[4 * 2] = 2.0;
        let dw = DepthwiseConv2d::new(3, 1, 2, weights);
        let x = seeded_tensor(4, 4, 2, 5);
        let y = dw.forward(&x);
        assert_eq!(y.get(2, 1, 0), 2.0 * x.get(2, 1, 0));
        assert_eq!(y.get(2, 1, 1), 0.0);
    }

    #[rstest]
    #[case(3, 1, 6)]
    #[case(5, 1, 5)]
    #[case(5, 2, 8)]
    #[case(3, 2, 7)]
    fn backward_matches_finite_differences(#[case] kernel: usize, #[case] stride: usize, #[case] side: usize) {
        let w = seeded_tensor(kernel, kernel, 3, 17).data;
        let dw = DepthwiseConv2d::new(kernel, stride, 3, w);
        let x = seeded_tensor(side, side, 3, 23);
        directional_check(&x, |t| dw.forward(t), |g| dw.backward_input(g, side, side));
    }
}
