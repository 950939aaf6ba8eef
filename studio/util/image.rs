//! Image transport helpers for the Grad-CAM studio.
//!
//! Images travel between the server and the browser as base64 PNG, either in
//! `data:` URIs for display or in a hidden form field that carries the
//! prepared network input from `/predict` to `/gradcam`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::png::PngEncoder, ColorType, ImageEncoder, RgbImage};

use ferrite_cam::CamError;

/// Encodes an RGB image as PNG bytes.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, CamError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .map_err(CamError::Encode)?;
    Ok(bytes)
}

/// Base64 PNG without the `data:` prefix, for hidden form fields.
pub fn png_base64(img: &RgbImage) -> Result<String, CamError> {
    Ok(STANDARD.encode(encode_png(img)?))
}

/// Decodes a base64 field, tolerating a leading `data:` URI header and the
/// whitespace some browsers insert when wrapping long values.
pub fn decode_base64_field(value: &str) -> Option<Vec<u8>> {
    let payload = match value.find("base64,") {
        Some(pos) => &value[pos + "base64,".len()..],
        None => value,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rstest::rstest;

    #[rstest]
    fn png_survives_the_form_field() {
        let img = RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8 * 40, y as u8 * 80, 7]));
        let field = png_base64(&img).expect("encode");
        let bytes = decode_base64_field(&field).expect("base64");
        let back = image::load_from_memory(&bytes).expect("png").to_rgb8();
        assert_eq!(back, img);
    }

    #[rstest]
    fn data_uri_prefix_is_accepted() {
        let img = RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]));
        let uri = format!("data:image/png;base64,{}", png_base64(&img).expect("encode"));
        let bytes = decode_base64_field(&uri).expect("base64");
        assert_eq!(image::load_from_memory(&bytes).expect("png").to_rgb8(), img);
    }

    #[rstest]
    fn garbage_is_rejected() {
        assert!(decode_base64_field("not base64 at all!").is_none());
    }
}
