//! Parameter sources for building a network.
//!
//! Tensor names follow the Keras weight paths of the reference model,
//! `"<layer>/<param>"`, with Keras layouts: conv kernels `(kh, kw, in, out)`,
//! depthwise kernels `(kh, kw, C, 1)`, dense kernels `(in, out)`.

use std::collections::HashMap;
use std::path::Path;

use rand::{rngs::StdRng, SeedableRng};
use safetensors::{Dtype, SafeTensors};
use tracing::{debug, info};

use crate::error::{CamError, Result};
use crate::layers::{BatchNorm, Conv2d, Dense, DepthwiseConv2d};
use crate::math::matrix::Matrix;

/// Supplies named parameter tensors, flattened in row-major order.
pub trait ParamSource {
    /// Returns tensor `name`, which must have exactly `shape`.
    fn tensor(&mut self, name: &str, shape: &[usize]) -> Result<Vec<f32>>;

    /// Like `tensor`, but a missing name is `Ok(None)`.
    fn optional(&mut self, name: &str, shape: &[usize]) -> Result<Option<Vec<f32>>>;
}

// ---------------------------------------------------------------------------
// safetensors archives
// ---------------------------------------------------------------------------

struct StoredTensor {
    shape: Vec<usize>,
    dtype: Dtype,
    values: Vec<f32>,
}

/// Reads weights from a `.safetensors` archive. Only F32 tensors can be
/// requested; other dtypes (e.g. integer counters) may be present as long as
/// nothing asks for them.
pub struct SafeTensorsSource {
    tensors: HashMap<String, StoredTensor>,
}

impl SafeTensorsSource {
    pub fn open(path: &Path) -> Result<SafeTensorsSource> {
        let bytes = std::fs::read(path)
            .map_err(|source| CamError::Io { path: path.to_owned(), source })?;
        let source = SafeTensorsSource::from_bytes(&bytes)?;
        info!(path = %path.display(), tensors = source.len(), "loaded weights archive");
        Ok(source)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<SafeTensorsSource> {
        let archive = SafeTensors::deserialize(bytes)?;
        let tensors = archive
            .tensors()
            .into_iter()
            .map(|(name, view)| {
                let values = if view.dtype() == Dtype::F32 {
                    view.data()
                        .chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect()
                } else {
                    Vec::new()
                };
                let stored = StoredTensor { shape: view.shape().to_vec(), dtype: view.dtype(), values };
                (name, stored)
            })
            .collect();
        Ok(SafeTensorsSource { tensors })
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl ParamSource for SafeTensorsSource {
    fn tensor(&mut self, name: &str, shape: &[usize]) -> Result<Vec<f32>> {
        self.optional(name, shape)?
            .ok_or_else(|| CamError::MissingTensor { name: name.to_owned() })
    }

    fn optional(&mut self, name: &str, shape: &[usize]) -> Result<Option<Vec<f32>>> {
        let Some(stored) = self.tensors.remove(name) else {
            return Ok(None);
        };
        if stored.dtype != Dtype::F32 {
            return Err(CamError::UnsupportedDtype {
                name: name.to_owned(),
                dtype: format!("{:?}", stored.dtype),
            });
        }
        if stored.shape != shape {
            return Err(CamError::ShapeMismatch {
                name: name.to_owned(),
                expected: shape.to_vec(),
                actual: stored.shape,
            });
        }
        Ok(Some(stored.values))
    }
}

// ---------------------------------------------------------------------------
// Seeded random weights
// ---------------------------------------------------------------------------

/// Deterministic random weights: Xavier-initialised kernels, identity batch
/// statistics, zero biases. Used for tests and for running the studio
/// without a weights archive.
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    pub fn new(seed: u64) -> RandomSource {
        RandomSource { rng: StdRng::seed_from_u64(seed) }
    }
}

impl ParamSource for RandomSource {
    fn tensor(&mut self, name: &str, shape: &[usize]) -> Result<Vec<f32>> {
        let len: usize = shape.iter().product();
        let param = name.rsplit('/').next().unwrap_or(name);
        let values = match param {
            "kernel" | "depthwise_kernel" => {
                let fan_in = if param == "depthwise_kernel" {
                    shape.iter().take(2).product()
                } else {
                    shape[..shape.len().saturating_sub(1)].iter().product()
                };
                Matrix::xavier(1, len, fan_in, &mut self.rng).data
            }
            "gamma" | "moving_variance" => vec![1.0; len],
            _ => vec![0.0; len],
        };
        Ok(values)
    }

    fn optional(&mut self, _name: &str, _shape: &[usize]) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Layer loaders
// ---------------------------------------------------------------------------

pub fn load_conv(
    src: &mut dyn ParamSource,
    name: &str,
    kernel: usize,
    stride: usize,
    in_channels: usize,
    out_channels: usize,
    with_bias: bool,
) -> Result<Conv2d> {
    let weights = src.tensor(&format!("{}/kernel", name), &[kernel, kernel, in_channels, out_channels])?;
    let bias = if with_bias {
        Some(src.tensor(&format!("{}/bias", name), &[out_channels])?)
    } else {
        None
    };
    debug!(layer = name, kernel, in_channels, out_channels, "conv");
    Ok(Conv2d::new(
        kernel,
        stride,
        Matrix::from_vec(kernel * kernel * in_channels, out_channels, weights),
        bias,
    ))
}

/// Keras 2 names the depthwise weight `depthwise_kernel`, Keras 3 `kernel`.
pub fn load_depthwise(
    src: &mut dyn ParamSource,
    name: &str,
    kernel: usize,
    stride: usize,
    channels: usize,
) -> Result<DepthwiseConv2d> {
    let shape = [kernel, kernel, channels, 1];
    let weights = match src.optional(&format!("{}/kernel", name), &shape)? {
        Some(weights) => weights,
        None => src.tensor(&format!("{}/depthwise_kernel", name), &shape)?,
    };
    Ok(DepthwiseConv2d::new(kernel, stride, channels, weights))
}

pub fn load_batch_norm(src: &mut dyn ParamSource, name: &str, channels: usize, epsilon: f32) -> Result<BatchNorm> {
    let gamma = src.tensor(&format!("{}/gamma", name), &[channels])?;
    let beta = src.tensor(&format!("{}/beta", name), &[channels])?;
    let mean = src.tensor(&format!("{}/moving_mean", name), &[channels])?;
    let variance = src.tensor(&format!("{}/moving_variance", name), &[channels])?;
    Ok(BatchNorm::from_stats(&gamma, &beta, &mean, &variance, epsilon))
}

pub fn load_dense(src: &mut dyn ParamSource, name: &str, input_size: usize, size: usize) -> Result<Dense> {
    let weights = src.tensor(&format!("{}/kernel", name), &[input_size, size])?;
    let biases = src.tensor(&format!("{}/bias", name), &[size])?;
    Ok(Dense::new(Matrix::from_vec(input_size, size, weights), biases))
}

// ---------------------------------------------------------------------------
// Test archives
// ---------------------------------------------------------------------------

/// Serializes `(name, shape, values)` triples as an F32 safetensors archive.
#[cfg(test)]
pub(crate) fn serialize_archive<N: AsRef<str>>(entries: &[(N, Vec<usize>, Vec<f32>)]) -> Vec<u8> {
    use safetensors::tensor::TensorView;

    let raw: Vec<(String, Vec<usize>, Vec<u8>)> = entries
        .iter()
        .map(|(n, s, v)| (n.as_ref().to_owned(), s.clone(), v.iter().flat_map(|x| x.to_le_bytes()).collect()))
        .collect();
    let views: Vec<(String, TensorView<'_>)> = raw
        .iter()
        .map(|(n, s, b)| (n.clone(), TensorView::new(Dtype::F32, s.clone(), b).expect("valid view")))
        .collect();
    safetensors::serialize(views, &None).expect("serialize archive")
}

/// `RandomSource` that remembers every tensor it hands out, so a network
/// built from it can be written back as an archive.
#[cfg(test)]
pub(crate) struct RecordingSource {
    inner: RandomSource,
    tensors: Vec<(String, Vec<usize>, Vec<f32>)>,
}

#[cfg(test)]
impl RecordingSource {
    pub(crate) fn new(seed: u64) -> RecordingSource {
        RecordingSource { inner: RandomSource::new(seed), tensors: Vec::new() }
    }

    pub(crate) fn into_tensors(self) -> Vec<(String, Vec<usize>, Vec<f32>)> {
        self.tensors
    }
}

#[cfg(test)]
impl ParamSource for RecordingSource {
    fn tensor(&mut self, name: &str, shape: &[usize]) -> Result<Vec<f32>> {
        let values = self.inner.tensor(name, shape)?;
        self.tensors.push((name.to_owned(), shape.to_vec(), values.clone()));
        Ok(values)
    }

    fn optional(&mut self, name: &str, shape: &[usize]) -> Result<Option<Vec<f32>>> {
        self.inner.optional(name, shape)
    }
}
