//! Image decoding and the network's fixed input transform.

use image::{imageops::FilterType, DynamicImage, RgbImage};

use crate::error::{CamError, Result};
use crate::math::tensor::Tensor;
use crate::network::spec::Preprocessing;

/// An image ready for the network.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// RGB pixels stretched to the network resolution. Overlays are drawn on
    /// this image.
    pub rgb: RgbImage,
    /// Normalized network input, `size × size × 3`.
    pub input: Tensor,
}

/// Decodes PNG/JPEG/BMP/GIF bytes. Any failure stops the request before
/// inference.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(CamError::Decode)
}

/// Drops alpha / expands grayscale, stretches to `size × size` (aspect ratio
/// is not kept) and applies the normalization transform.
pub fn prepare(image: &DynamicImage, size: u32, preprocessing: &Preprocessing) -> PreparedImage {
    let rgb = image.to_rgb8();
    let rgb = if rgb.dimensions() == (size, size) {
        rgb
    } else {
        image::imageops::resize(&rgb, size, size, FilterType::CatmullRom)
    };
    let input = to_tensor(&rgb, preprocessing);
    PreparedImage { rgb, input }
}

/// `(pixel / 255 - mean) / std` per channel, in H×W×C order.
pub fn to_tensor(rgb: &RgbImage, preprocessing: &Preprocessing) -> Tensor {
    let (width, height) = rgb.dimensions();
    let data = rgb
        .pixels()
        .flat_map(|p| {
            (0..3).map(move |c| (p.0[c] as f32 / 255.0 - preprocessing.mean[c]) / preprocessing.std[c])
        })
        .collect();
    Tensor::from_vec(height as usize, width as usize, 3, data)
}
