use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for per-pipeline events: progress, stage timings and metrics.
///
/// Sessions and upload jobs each own one, so the orchestration code never
/// decides where diagnostics go.
pub trait PipelineLogger: Send {
    /// Report frame-level progress. `total` is 0 for live sources.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. region count).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. Used in tests.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Stats {
    count: usize,
    total: f64,
    max: f64,
}

impl Stats {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = self.max.max(value);
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Routes pipeline events to the `log` crate, prefixed with a label such
/// as the session id.
///
/// Progress lines are throttled to one every `throttle_frames` frames.
pub struct LogPipelineLogger {
    label: String,
    throttle_frames: usize,
    timings: BTreeMap<String, Stats>,
    metrics: BTreeMap<String, Stats>,
    start_time: Instant,
    frames: usize,
}

impl LogPipelineLogger {
    pub fn new(label: impl Into<String>, throttle_frames: usize) -> Self {
        Self {
            label: label.into(),
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// Formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "[{}] {} frames in {elapsed_s:.1}s",
            self.label, self.frames
        )];
        for (stage, stats) in &self.timings {
            lines.push(format!(
                "  {stage:8}: avg {:6.1}ms  max {:6.1}ms  total {:7.0}ms",
                stats.mean(),
                stats.max,
                stats.total
            ));
        }
        for (name, stats) in &self.metrics {
            lines.push(format!("  {name}: avg {:.1}  max {:.0}", stats.mean(), stats.max));
        }
        if self.frames > 0 && elapsed_s > 0.0 {
            lines.push(format!("  throughput: {:.1} fps", self.frames as f64 / elapsed_s));
        }
        Some(lines.join("\n"))
    }

    fn mean_timing(&self, stage: &str) -> Option<f64> {
        self.timings.get(stage).map(Stats::mean)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames = current;
        if current % self.throttle_frames != 0 && current != total {
            return;
        }
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("[{}] {current}/{total} frames ({pct:.1}%)", self.label);
        } else {
            log::debug!("[{}] {current} frames", self.label);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("[{}] {message}", self.label);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullPipelineLogger;
        logger.progress(1, 10);
        logger.timing("detect", 5.0);
        logger.metric("regions", 3.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timings_are_averaged_per_stage() {
        let mut logger = LogPipelineLogger::new("alice", 10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("encode", 5.0);

        assert_relative_eq!(logger.mean_timing("detect").unwrap(), 25.0);
        assert_relative_eq!(logger.mean_timing("encode").unwrap(), 5.0);
        assert!(logger.mean_timing("match").is_none());
    }

    #[test]
    fn test_summary_lists_stages_and_metrics() {
        let mut logger = LogPipelineLogger::new("alice", 10);
        logger.progress(10, 0);
        logger.timing("detect", 10.0);
        logger.timing("match", 2.0);
        logger.metric("regions", 3.0);
        logger.metric("regions", 4.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.starts_with("[alice] 10 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("match"));
        assert!(summary.contains("regions: avg 3.5  max 4"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogPipelineLogger::new("idle", 10).summary_string().is_none());
    }

    #[test]
    fn test_progress_tracks_frame_count() {
        let mut logger = LogPipelineLogger::new("job", 10);
        for i in 1..=25 {
            logger.progress(i, 25);
        }
        assert_eq!(logger.frames, 25);
    }

    #[test]
    fn test_zero_throttle_is_clamped() {
        assert_eq!(LogPipelineLogger::new("x", 0).throttle_frames, 1);
    }
}
