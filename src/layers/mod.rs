pub mod padding;
pub mod conv;
pub mod depthwise;
pub mod batch_norm;
pub mod dense;

#[cfg(test)]
pub(crate) mod test_support;

pub use padding::Padding;
pub use conv::Conv2d;
pub use depthwise::DepthwiseConv2d;
pub use batch_norm::BatchNorm;
pub use dense::Dense;
