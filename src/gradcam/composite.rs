use image::{imageops::FilterType, Rgb, RgbImage};

use crate::error::{CamError, Result};
use crate::gradcam::colormap::Colormap;
use crate::gradcam::synthesize::Heatmap;

/// Heatmap opacity used unless configured otherwise.
pub const DEFAULT_ALPHA: f32 = 0.4;

/// Renders heatmaps and blends them over an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Compositor {
    colormap: Colormap,
    alpha: f32,
}

impl Compositor {
    pub fn new(alpha: f32) -> Result<Compositor> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(CamError::Config(format!("alpha must lie in (0, 1], got {}", alpha)));
        }
        Ok(Compositor { colormap: Colormap::jet(), alpha })
    }

    /// Color-maps the heatmap at its native resolution.
    pub fn colorize(&self, heatmap: &Heatmap) -> RgbImage {
        RgbImage::from_fn(heatmap.width as u32, heatmap.height as u32, |x, y| {
            let intensity = (heatmap.get(x as usize, y as usize) * 255.0) as u8;
            Rgb(self.colormap.color(intensity))
        })
    }

    /// `heat · alpha + base` per channel, clamped to 255. The colored heatmap
    /// is bilinearly upsampled to the base image's dimensions first, so the
    /// output always has the dimensions of `base`.
    pub fn composite(&self, base: &RgbImage, heatmap: &Heatmap) -> RgbImage {
        let (width, height) = base.dimensions();
        let heat = self.colorize(heatmap);
        let heat = if heat.dimensions() == (width, height) {
            heat
        } else {
            image::imageops::resize(&heat, width, height, FilterType::Triangle)
        };

        let mut out = base.clone();
        for (px, h) in out.pixels_mut().zip(heat.pixels()) {
            for c in 0..3 {
                let v = h.0[c] as f32 * self.alpha + px.0[c] as f32;
                px.0[c] = v.min(255.0) as u8;
            }
        }
        out
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Compositor { colormap: Colormap::jet(), alpha: DEFAULT_ALPHA }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ramp(width: usize, height: usize) -> Heatmap {
        let n = (width * height) as f32;
        Heatmap { width, height, values: (0..width * height).map(|i| i as f32 / (n - 1.0)).collect() }
    }

    #[rstest]
    #[case(7, 7, 224)]
    #[case(1, 1, 64)]
    #[case(112, 112, 224)]
    #[case(3, 5, 32)]
    fn output_takes_the_base_dimensions(#[case] w: usize, #[case] h: usize, #[case] size: u32) {
        let base = RgbImage::from_pixel(size, size, Rgb([10, 10, 10]));
        let out = Compositor::default().composite(&base, &ramp(w, h));
        assert_eq!(out.dimensions(), (size, size));
    }

    #[rstest]
    fn blend_is_additive() {
        let base = RgbImage::from_pixel(2, 2, Rgb([100, 0, 50]));
        let map = Heatmap::zeros(2, 2);
        let out = Compositor::new(0.5).expect("alpha").composite(&base, &map);
        // intensity 0 is jet (0, 0, 128) -> (100 + 0, 0 + 0, 50 + 64)
        assert_eq!(out.get_pixel(1, 1), &Rgb([100, 0, 114]));
    }

    #[rstest]
    fn overflow_saturates() {
        let base = RgbImage::from_pixel(1, 1, Rgb([250, 250, 250]));
        let map = Heatmap { width: 1, height: 1, values: vec![1.0] };
        let out = Compositor::new(1.0).expect("alpha").composite(&base, &map);
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 250, 250]));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-0.1)]
    #[case(1.5)]
    #[case(f32::NAN)]
    fn rejects_bad_alpha(#[case] alpha: f32) {
        assert!(Compositor::new(alpha).is_err());
    }
}
