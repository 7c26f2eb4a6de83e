use std::sync::Arc;
use std::time::Instant;

use crate::alert::alert_dispatcher::AlertDispatcher;
use crate::alert::domain::alert_event::TriggerReason;
use crate::detection::domain::detection_engine::DetectionEngine;
use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::model_ref::ModelRef;
use crate::detection::infrastructure::model_cache::ModelCache;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::frame::Frame;
use crate::shared::settings::MotionSettings;
use crate::watchlist::watchlist_store::WatchlistStore;

/// Process-wide collaborators every pipeline draws on.
#[derive(Clone)]
pub struct PipelineContext {
    pub models: Arc<ModelCache>,
    pub watchlist: Arc<WatchlistStore>,
    pub alerts: Arc<AlertDispatcher>,
    pub motion: MotionSettings,
}

impl PipelineContext {
    /// Builds a pipeline for one session. A model that cannot be loaded
    /// leaves the pipeline on the motion fallback.
    pub fn pipeline(
        &self,
        session_id: &str,
        model: Option<&ModelRef>,
        logger: Box<dyn PipelineLogger>,
    ) -> FramePipeline {
        let detector = model.and_then(|m| self.models.get_or_log(m));
        FramePipeline {
            session_id: session_id.to_string(),
            engine: DetectionEngine::new(detector, &self.motion),
            watchlist: Arc::clone(&self.watchlist),
            alerts: Arc::clone(&self.alerts),
            logger,
            frames: 0,
            alerts_raised: 0,
        }
    }
}

/// What the pipeline concluded about one frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub detection: DetectionResult,
    pub watchlist_match: bool,
    pub reason: Option<TriggerReason>,
}

/// Detect, match and alert for one session, one frame at a time.
///
/// Every frame is matched against the watchlist snapshot current at that
/// moment, so a refresh takes effect on the next frame.
pub struct FramePipeline {
    session_id: String,
    engine: DetectionEngine,
    watchlist: Arc<WatchlistStore>,
    alerts: Arc<AlertDispatcher>,
    logger: Box<dyn PipelineLogger>,
    frames: usize,
    alerts_raised: usize,
}

impl FramePipeline {
    pub fn process(&mut self, frame: &Frame, total: usize) -> FrameOutcome {
        let rgb;
        let frame = if frame.channels() == 3 {
            frame
        } else {
            rgb = frame.to_rgb();
            &rgb
        };

        let t = Instant::now();
        let detection = self.engine.detect(frame);
        self.logger.timing("detect", t.elapsed().as_secs_f64() * 1000.0);
        self.logger.metric("regions", detection.regions.len() as f64);

        let t = Instant::now();
        let snapshot = self.watchlist.current();
        let watchlist_match = self.watchlist.matches(frame, &snapshot);
        self.logger.timing("match", t.elapsed().as_secs_f64() * 1000.0);

        let reason = TriggerReason::from_flags(detection.anomaly, watchlist_match);
        if let Some(reason) = reason {
            self.alerts.dispatch(&self.session_id, frame.clone(), reason);
            self.alerts_raised += 1;
        }

        self.frames += 1;
        self.logger.progress(self.frames, total);

        FrameOutcome {
            detection,
            watchlist_match,
            reason,
        }
    }

    /// Records time spent outside the pipeline, such as stream encoding.
    pub fn record_timing(&mut self, stage: &str, duration_ms: f64) {
        self.logger.timing(stage, duration_ms);
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn alerts_raised(&self) -> usize {
        self.alerts_raised
    }

    pub fn finish(&self) {
        self.logger.summary();
    }
}
