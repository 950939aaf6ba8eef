#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};

use ferrite_cam::{GradCam, NetworkSpec};

/// Seeded tiny engine: full B0 topology at quarter width, 64px input,
/// ten `class_<n>` labels.
pub fn tiny_engine() -> GradCam {
    GradCam::random(NetworkSpec::tiny(), 42).expect("tiny engine")
}

/// A bright disc on a horizontal colour ramp, `width × height`.
pub fn synthetic_image(width: u32, height: u32) -> DynamicImage {
    let (cx, cy) = (width as f32 * 0.6, height as f32 * 0.4);
    let radius = width.min(height) as f32 * 0.25;
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let (dx, dy) = (x as f32 - cx, y as f32 - cy);
        if dx * dx + dy * dy < radius * radius {
            Rgb([240, 200, 40])
        } else {
            let t = (x * 255 / width.max(1)) as u8;
            Rgb([t / 3, 60, 255 - t])
        }
    }))
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .expect("png encode");
    bytes
}

pub fn approx_eq(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() < tol
}
