/// Zero padding applied around a feature map before a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Padding {
    /// Keras `padding="same"` at stride 1: the output keeps the input size,
    /// with the odd pixel (for even kernels) going to the bottom/right.
    pub fn same(kernel: usize) -> Padding {
        let total = kernel.saturating_sub(1);
        let before = total / 2;
        let after = total - before;
        Padding { top: before, bottom: after, left: before, right: after }
    }

    /// EfficientNet's `correct_pad`: explicit zero padding placed in front of
    /// a stride-2 `valid` convolution. Even input sides lose one pixel of
    /// leading padding so the output is exactly half the input.
    pub fn correct_pad(height: usize, width: usize, kernel: usize) -> Padding {
        let half = kernel / 2;
        let lead = |side: usize| if side % 2 == 0 { half.saturating_sub(1) } else { half };
        Padding { top: lead(height), bottom: half, left: lead(width), right: half }
    }

    /// Padding used by every convolution in the network for a given stride.
    pub fn for_conv(height: usize, width: usize, kernel: usize, stride: usize) -> Padding {
        if stride == 1 {
            Padding::same(kernel)
        } else {
            Padding::correct_pad(height, width, kernel)
        }
    }

    /// Output (height, width) of a `valid` convolution over the padded input.
    pub fn output_size(&self, height: usize, width: usize, kernel: usize, stride: usize) -> (usize, usize) {
        let padded_h = height + self.top + self.bottom;
        let padded_w = width + self.left + self.right;
        assert!(
            padded_h >= kernel && padded_w >= kernel,
            "input {}x{} is smaller than the {}x{} kernel",
            height, width, kernel, kernel
        );
        ((padded_h - kernel) / stride + 1, (padded_w - kernel) / stride + 1)
    }

    /// Maps an output coordinate plus kernel offset back to the unpadded
    /// input, or `None` when it lands in the zero border.
    #[inline]
    pub fn source(out: usize, offset: usize, stride: usize, lead: usize, limit: usize) -> Option<usize> {
        let padded = out * stride + offset;
        if padded < lead {
            return None;
        }
        let src = padded - lead;
        if src < limit { Some(src) } else { None }
    }
}
