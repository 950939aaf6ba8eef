use crate::layers::padding::Padding;
use crate::math::{matrix::Matrix, tensor::Tensor};

/// Standard 2-D convolution with a square kernel.
///
/// `weights` holds the Keras HWIO kernel flattened to a matrix of shape
/// `(kernel * kernel * in_channels, out_channels)`: row
/// `(ky * kernel + kx) * in_channels + ci` is the fan-out of one input tap.
#[derive(Debug, Clone)]
pub struct Conv2d {
    pub kernel_size: usize,
    pub stride: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub weights: Matrix,
    pub bias: Option<Vec<f32>>,
}

impl Conv2d {
    pub fn new(kernel_size: usize, stride: usize, weights: Matrix, bias: Option<Vec<f32>>) -> Conv2d {
        let in_channels = weights.rows / (kernel_size * kernel_size);
        assert_eq!(
            in_channels * kernel_size * kernel_size,
            weights.rows,
            "kernel rows must be a multiple of kernel_size²"
        );
        if let Some(b) = &bias {
            assert_eq!(b.len(), weights.cols, "one bias per output channel required");
        }
        Conv2d {
            kernel_size,
            stride,
            in_channels,
            out_channels: weights.cols,
            weights,
            bias,
        }
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        assert_eq!(input.channels, self.in_channels, "Conv2d input channel mismatch");
        let (h, w) = (input.height, input.width);
        let k = self.kernel_size;
        let pad = Padding::for_conv(h, w, k, self.stride);
        let (oh, ow) = pad.output_size(h, w, k, self.stride);
        let mut out = Tensor::zeros(oh, ow, self.out_channels);

        for oy in 0..oh {
            for ox in 0..ow {
                let start = out.index(oy, ox, 0);
                let acc = &mut out.data[start..start + self.out_channels];
                if let Some(bias) = &self.bias {
                    acc.copy_from_slice(bias);
                }
                for ky in 0..k {
                    let Some(iy) = Padding::source(oy, ky, self.stride, pad.top, h) else { continue };
                    for kx in 0..k {
                        let Some(ix) = Padding::source(ox, kx, self.stride, pad.left, w) else { continue };
                        let tap = (ky * k + kx) * self.in_channels;
                        for (ci, &v) in input.pixel(iy, ix).iter().enumerate() {
                            if v == 0.0 {
                                continue;
                            }
                            for (a, &wt) in acc.iter_mut().zip(self.weights.row(tap + ci)) {
                                *a += v * wt;
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Gradient of the loss w.r.t. this layer's input, given the gradient
    /// w.r.t. its output and the spatial size of the input it consumed.
    pub fn backward_input(&self, grad_out: &Tensor, in_height: usize, in_width: usize) -> Tensor {
        assert_eq!(grad_out.channels, self.out_channels, "Conv2d gradient channel mismatch");
        let k = self.kernel_size;
        let pad = Padding::for_conv(in_height, in_width, k, self.stride);
        let mut grad_in = Tensor::zeros(in_height, in_width, self.in_channels);

        for oy in 0..grad_out.height {
            for ox in 0..grad_out.width {
                let g = grad_out.pixel(oy, ox);
                if g.iter().all(|&v| v == 0.0) {
                    continue;
                }
                for ky in 0..k {
                    let Some(iy) = Padding::source(oy, ky, self.stride, pad.top, in_height) else { continue };
                    for kx in 0..k {
                        let Some(ix) = Padding::source(ox, kx, self.stride, pad.left, in_width) else { continue };
                        let tap = (ky * k + kx) * self.in_channels;
                        let start = grad_in.index(iy, ix, 0);
                        let gi = &mut grad_in.data[start..start + self.in_channels];
                        for (ci, slot) in gi.iter_mut().enumerate() {
                            *slot += self.weights.row(tap + ci).iter().zip(g).map(|(w, g)| w * g).sum::<f32>();
                        }
                    }
                }
            }
        }
        grad_in
    }
}
