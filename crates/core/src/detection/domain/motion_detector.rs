use std::collections::VecDeque;

use crate::detection::domain::background_model::{BackgroundModel, FOREGROUND};
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::shared::settings::MotionSettings;

pub const MOTION_LABEL: &str = "motion";

const MEDIAN_RADIUS: i64 = 2;
const BINARY_THRESHOLD: u8 = 127;

/// Model-free anomaly detector: boxes connected foreground blobs whose
/// pixel area exceeds the configured threshold.
///
/// Frames inside the warm-up window still train the background model but
/// never produce regions.
pub struct MotionDetector {
    background: BackgroundModel,
    area_threshold: u32,
    warmup_frames: u32,
}

impl MotionDetector {
    pub fn new(settings: &MotionSettings) -> Self {
        Self {
            background: BackgroundModel::new(settings.history, settings.var_threshold),
            area_threshold: settings.area_threshold,
            warmup_frames: settings.warmup_frames,
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> Vec<Region> {
        let (w, h) = (frame.width(), frame.height());
        let mask = self.background.apply(&frame.to_luma(), w, h);
        if self.background.frames_seen() <= self.warmup_frames {
            return Vec::new();
        }

        let smoothed = median_5x5(&mask, w as usize, h as usize);
        let binary: Vec<bool> = smoothed.iter().map(|&v| v > BINARY_THRESHOLD).collect();

        connected_components(&binary, w as usize, h as usize)
            .into_iter()
            .filter(|c| c.area > self.area_threshold as usize)
            .map(|c| Region::new(c.x1, c.y1, c.x2, c.y2, MOTION_LABEL, 1.0))
            .collect()
    }
}

/// 5×5 median of a binary mask with replicated borders.
///
/// For a two-valued image the median is foreground exactly when at least
/// 13 of the 25 window pixels are, so a separable box count suffices.
fn median_5x5(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let clamp = |v: i64, len: usize| v.clamp(0, len as i64 - 1) as usize;

    let mut row_counts = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let mut count = 0u8;
            for dx in -MEDIAN_RADIUS..=MEDIAN_RADIUS {
                let sx = clamp(x as i64 + dx, width);
                if mask[y * width + sx] == FOREGROUND {
                    count += 1;
                }
            }
            row_counts[y * width + x] = count;
        }
    }

    let majority = ((2 * MEDIAN_RADIUS + 1).pow(2) / 2 + 1) as u32;
    let mut out = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let mut count = 0u32;
            for dy in -MEDIAN_RADIUS..=MEDIAN_RADIUS {
                let sy = clamp(y as i64 + dy, height);
                count += row_counts[sy * width + x] as u32;
            }
            if count >= majority {
                out[y * width + x] = FOREGROUND;
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
struct Component {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    area: usize,
}

/// 8-connected components in raster order of their first pixel.
fn connected_components(binary: &[bool], width: usize, height: usize) -> Vec<Component> {
    let mut visited = vec![false; binary.len()];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..binary.len() {
        if !binary[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);

        let (sx, sy) = ((start % width) as i32, (start / width) as i32);
        let mut c = Component {
            x1: sx,
            y1: sy,
            x2: sx + 1,
            y2: sy + 1,
            area: 0,
        };

        while let Some(idx) = queue.pop_front() {
            let (x, y) = ((idx % width) as i32, (idx / width) as i32);
            c.area += 1;
            c.x1 = c.x1.min(x);
            c.y1 = c.y1.min(y);
            c.x2 = c.x2.max(x + 1);
            c.y2 = c.y2.max(y + 1);

            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                        continue;
                    }
                    let n = ny as usize * width + nx as usize;
                    if binary[n] && !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }
        }
        components.push(c);
    }
    components
}
