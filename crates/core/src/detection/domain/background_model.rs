/// Per-pixel running Gaussian background model over an intensity plane.
///
/// Each pixel tracks a mean and variance. A pixel is foreground when its
/// squared deviation from the mean exceeds `var_threshold` times the
/// variance. The learning rate starts at 1 and settles at `1 / history`,
/// so early frames adapt fast and later ones blend slowly.
pub struct BackgroundModel {
    history: u32,
    var_threshold: f32,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u32,
}

pub const INITIAL_VARIANCE: f32 = 15.0;
pub const MIN_VARIANCE: f32 = 4.0;
pub const MAX_VARIANCE: f32 = 75.0;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

impl BackgroundModel {
    pub fn new(history: u32, var_threshold: f32) -> Self {
        Self {
            history: history.max(1),
            var_threshold,
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    /// Classifies every pixel of `luma` against the model, then folds the
    /// frame into it. Returns a `FOREGROUND`/`BACKGROUND` mask.
    ///
    /// The first frame, and any frame whose size differs from the model,
    /// re-seeds the model and is reported as all background.
    pub fn apply(&mut self, luma: &[u8], width: u32, height: u32) -> Vec<u8> {
        debug_assert_eq!(luma.len(), width as usize * height as usize);

        if self.frames_seen == 0 || width != self.width || height != self.height {
            self.seed(luma, width, height);
            return vec![BACKGROUND; luma.len()];
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = 1.0 / self.frames_seen.min(self.history) as f32;

        let mut mask = Vec::with_capacity(luma.len());
        for ((&px, mean), variance) in luma
            .iter()
            .zip(self.mean.iter_mut())
            .zip(self.variance.iter_mut())
        {
            let d = px as f32 - *mean;
            let d2 = d * d;
            mask.push(if d2 > self.var_threshold * *variance {
                FOREGROUND
            } else {
                BACKGROUND
            });

            *mean += alpha * d;
            *variance = (*variance + alpha * (d2 - *variance)).clamp(MIN_VARIANCE, MAX_VARIANCE);
        }
        mask
    }

    fn seed(&mut self, luma: &[u8], width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.mean = luma.iter().map(|&v| v as f32).collect();
        self.variance = vec![INITIAL_VARIANCE; luma.len()];
        self.frames_seen = 1;
    }
}
