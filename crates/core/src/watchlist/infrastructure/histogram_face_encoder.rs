//! Colour-histogram face encoder.
//!
//! Encodes a crop as its normalised hue/saturation/value histogram. Needs
//! no model, so it works anywhere, but it only tells faces apart by colour
//! distribution and is far weaker than an embedding model.

use crate::shared::frame::Frame;
use crate::watchlist::domain::face_encoder::{l2_normalize, FaceEncoder};

const HUE_BINS: usize = 16;
const SAT_BINS: usize = 4;
const VAL_BINS: usize = 4;

#[derive(Debug, Default, Clone, Copy)]
pub struct HistogramFaceEncoder;

impl HistogramFaceEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl FaceEncoder for HistogramFaceEncoder {
    fn encode(&self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        if face.channels() != 3 {
            return Err(format!("expected an RGB crop, got {} channels", face.channels()).into());
        }
        let mut hist = vec![0.0f32; self.dimension()];
        for px in face.data().chunks_exact(3) {
            let (h, s, v) = rgb_to_hsv(
                px[0] as f64 / 255.0,
                px[1] as f64 / 255.0,
                px[2] as f64 / 255.0,
            );
            let h_bin = bin(h / 360.0, HUE_BINS);
            let s_bin = bin(s, SAT_BINS);
            let v_bin = bin(v, VAL_BINS);
            hist[(h_bin * SAT_BINS + s_bin) * VAL_BINS + v_bin] += 1.0;
        }
        l2_normalize(&mut hist);
        Ok(hist)
    }

    fn dimension(&self) -> usize {
        HUE_BINS * SAT_BINS * VAL_BINS
    }
}

fn bin(unit: f64, bins: usize) -> usize {
    ((unit * bins as f64) as usize).min(bins - 1)
}

fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    (h, s, max)
}
