//! The "jet" perceptual color table (blue → cyan → yellow → red).

/// `(x, y)` anchors of one color channel, linearly interpolated between.
type Segments = &'static [(f32, f32)];

const RED: Segments = &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const GREEN: Segments = &[(0.0, 0.0), (0.125, 0.0), (0.375, 1.0), (0.64, 1.0), (0.91, 0.0), (1.0, 0.0)];
const BLUE: Segments = &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

/// 256-entry RGB lookup table indexed by 8-bit intensity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Colormap {
    table: Vec<[u8; 3]>,
}

impl Colormap {
    pub fn jet() -> Colormap {
        let table = (0..256)
            .map(|i| {
                let x = i as f32 / 255.0;
                [to_u8(interpolate(RED, x)), to_u8(interpolate(GREEN, x)), to_u8(interpolate(BLUE, x))]
            })
            .collect();
        Colormap { table }
    }

    pub fn color(&self, intensity: u8) -> [u8; 3] {
        self.table[intensity as usize]
    }
}

impl Default for Colormap {
    fn default() -> Self {
        Colormap::jet()
    }
}

fn interpolate(segments: Segments, x: f32) -> f32 {
    for pair in segments.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if x <= x1 {
            let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
            return y0 + t.clamp(0.0, 1.0) * (y1 - y0);
        }
    }
    segments.last().map_or(0.0, |&(_, y)| y)
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
