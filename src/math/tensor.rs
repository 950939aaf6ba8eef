use serde::{Serialize, Deserialize};

/// A single feature map in height × width × channels layout.
///
/// Element (y, x, c) lives at `data[(y * width + x) * channels + c]`, which is
/// the channels-last layout of the Keras kernels this crate loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(height: usize, width: usize, channels: usize) -> Tensor {
        Tensor {
            height,
            width,
            channels,
            data: vec![0.0; height * width * channels],
        }
    }

    /// Wraps an existing buffer. Panics when the length does not match the shape.
    pub fn from_vec(height: usize, width: usize, channels: usize, data: Vec<f32>) -> Tensor {
        assert_eq!(
            data.len(),
            height * width * channels,
            "Tensor data does not match {}x{}x{}",
            height, width, channels
        );
        Tensor { height, width, channels, data }
    }

    /// A 1×1 spatial tensor holding one value per channel.
    pub fn from_channels(values: Vec<f32>) -> Tensor {
        let channels = values.len();
        Tensor::from_vec(1, 1, channels, values)
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    pub fn zeros_like(&self) -> Tensor {
        Tensor::zeros(self.height, self.width, self.channels)
    }

    pub fn pixels(&self) -> usize {
        self.height * self.width
    }

    #[inline]
    pub fn index(&self, y: usize, x: usize, c: usize) -> usize {
        (y * self.width + x) * self.channels + c
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[self.index(y, x, c)]
    }

    /// Slice of all channels at one spatial location.
    pub fn pixel(&self, y: usize, x: usize) -> &[f32] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            height: self.height,
            width: self.width,
            channels: self.channels,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Element-wise combination of two same-shape tensors.
    pub fn zip_map<F>(&self, other: &Tensor, functor: F) -> Tensor
    where
        F: Fn(f32, f32) -> f32,
    {
        assert_eq!(self.shape(), other.shape(), "Tensors are of incorrect sizes");
        Tensor {
            height: self.height,
            width: self.width,
            channels: self.channels,
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| functor(a, b)).collect(),
        }
    }

    pub fn add(&self, other: &Tensor) -> Tensor {
        self.zip_map(other, |a, b| a + b)
    }

    /// Multiplies every channel by its own factor.
    pub fn scale_channels(&self, factors: &[f32]) -> Tensor {
        assert_eq!(factors.len(), self.channels, "one factor per channel required");
        let mut out = self.clone();
        for px in out.data.chunks_mut(self.channels) {
            for (v, f) in px.iter_mut().zip(factors) {
                *v *= f;
            }
        }
        out
    }

    /// Mean over both spatial axes, one value per channel.
    pub fn global_average_pool(&self) -> Vec<f32> {
        let mut sums = vec![0.0f32; self.channels];
        for px in self.data.chunks(self.channels) {
            for (s, v) in sums.iter_mut().zip(px) {
                *s += v;
            }
        }
        let n = self.pixels().max(1) as f32;
        sums.iter().map(|s| s / n).collect()
    }

    /// Gradient of `global_average_pool`: spreads each channel's gradient
    /// evenly over the `height × width` locations.
    pub fn broadcast_pool_grad(grad: &[f32], height: usize, width: usize) -> Tensor {
        let n = (height * width).max(1) as f32;
        let per_pixel: Vec<f32> = grad.iter().map(|g| g / n).collect();
        let mut data = Vec::with_capacity(height * width * grad.len());
        for _ in 0..height * width {
            data.extend_from_slice(&per_pixel);
        }
        Tensor::from_vec(height, width, grad.len(), data)
    }

    /// Sum over channels of `self[y, x, c] * weights[c]`, producing a
    /// row-major `height × width` map.
    pub fn weighted_channel_sum(&self, weights: &[f32]) -> Vec<f32> {
        assert_eq!(weights.len(), self.channels, "one weight per channel required");
        self.data
            .chunks(self.channels)
            .map(|px| px.iter().zip(weights).map(|(a, w)| a * w).sum())
            .collect()
    }

    /// Per-channel sum of the element-wise product of two same-shape tensors.
    pub fn channel_dot(&self, other: &Tensor) -> Vec<f32> {
        assert_eq!(self.shape(), other.shape(), "Tensors are of incorrect sizes");
        let mut sums = vec![0.0f32; self.channels];
        for (pa, pb) in self.data.chunks(self.channels).zip(other.data.chunks(self.channels)) {
            for ((s, a), b) in sums.iter_mut().zip(pa).zip(pb) {
                *s += a * b;
            }
        }
        sums
    }
}
