use std::sync::Arc;

use crate::detection::domain::annotator::{annotate, MODEL_BOX_COLOR, MOTION_BOX_COLOR};
use crate::detection::domain::detection_result::{DetectionResult, Strategy};
use crate::detection::domain::motion_detector::MotionDetector;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::frame::Frame;
use crate::shared::settings::MotionSettings;

enum ActiveStrategy {
    Model(Arc<dyn ObjectDetector>),
    Fallback,
}

/// Per-session analysis: model inference when a model is available, the
/// motion detector otherwise.
///
/// The first inference error demotes the engine to the motion detector for
/// the rest of its life; the frame that failed is analysed by the motion
/// detector instead.
///
/// Frames that are not RGB are expanded to RGB before analysis, so the
/// annotated frame is always three-channel.
pub struct DetectionEngine {
    strategy: ActiveStrategy,
    motion: MotionDetector,
}

impl DetectionEngine {
    pub fn new(model: Option<Arc<dyn ObjectDetector>>, motion: &MotionSettings) -> Self {
        let strategy = match model {
            Some(detector) => ActiveStrategy::Model(detector),
            None => ActiveStrategy::Fallback,
        };
        Self {
            strategy,
            motion: MotionDetector::new(motion),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self.strategy {
            ActiveStrategy::Model(_) => Strategy::Model,
            ActiveStrategy::Fallback => Strategy::Fallback,
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> DetectionResult {
        let rgb;
        let frame = if frame.channels() == 3 {
            frame
        } else {
            rgb = frame.to_rgb();
            &rgb
        };

        if let ActiveStrategy::Model(detector) = &self.strategy {
            match detector.detect(frame) {
                Ok(regions) => {
                    let regions: Vec<_> = regions
                        .into_iter()
                        .map(|r| r.clamped(frame.width(), frame.height()))
                        .collect();
                    return DetectionResult {
                        annotated: annotate(frame, &regions, MODEL_BOX_COLOR, true),
                        anomaly: !regions.is_empty(),
                        regions,
                        strategy: Strategy::Model,
                    };
                }
                Err(e) => {
                    log::warn!(
                        "Model inference failed on frame {}, switching to motion detection: {e}",
                        frame.index()
                    );
                    self.strategy = ActiveStrategy::Fallback;
                }
            }
        }

        let regions = self.motion.detect(frame);
        DetectionResult {
            annotated: annotate(frame, &regions, MOTION_BOX_COLOR, false),
            anomaly: !regions.is_empty(),
            regions,
            strategy: Strategy::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::shared::region::Region;

    struct FixedDetector(Vec<Region>);

    impl ObjectDetector for FixedDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    /// Succeeds `ok_calls` times, then fails on every call.
    struct FlakyDetector {
        calls: AtomicUsize,
        ok_calls: usize,
    }

    impl ObjectDetector for FlakyDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.ok_calls {
                Ok(Vec::new())
            } else {
                Err("inference backend crashed".into())
            }
        }
    }

    fn frame() -> Frame {
        Frame::filled(64, 48, [30, 30, 30], 0)
    }

    #[test]
    fn test_without_model_uses_fallback() {
        let mut engine = DetectionEngine::new(None, &MotionSettings::default());
        let result = engine.detect(&frame());
        assert_eq!(result.strategy, Strategy::Fallback);
        assert!(!result.anomaly);
    }

    #[test]
    fn test_model_regions_raise_anomaly_and_are_drawn() {
        let detector = FixedDetector(vec![Region::new(10, 10, 40, 40, "person", 0.8)]);
        let mut engine = DetectionEngine::new(Some(Arc::new(detector)), &MotionSettings::default());
        let input = frame();
        let result = engine.detect(&input);

        assert_eq!(result.strategy, Strategy::Model);
        assert!(result.anomaly);
        assert_eq!(result.regions.len(), 1);
        assert_ne!(result.annotated, input);
        let view = result.annotated.as_ndarray();
        assert_eq!(view[[10, 10, 0]], MODEL_BOX_COLOR[0]);
    }

    #[test]
    fn test_model_without_regions_is_not_anomalous() {
        let mut engine =
            DetectionEngine::new(Some(Arc::new(FixedDetector(Vec::new()))), &MotionSettings::default());
        let result = engine.detect(&frame());
        assert!(!result.anomaly);
        assert_eq!(result.annotated, frame());
    }

    #[test]
    fn test_inference_error_switches_permanently() {
        let detector = Arc::new(FlakyDetector {
            calls: AtomicUsize::new(0),
            ok_calls: 1,
        });
        let mut engine = DetectionEngine::new(Some(detector.clone()), &MotionSettings::default());

        assert_eq!(engine.detect(&frame()).strategy, Strategy::Model);
        let failing = engine.detect(&frame());
        assert_eq!(failing.strategy, Strategy::Fallback);
        assert_eq!(engine.strategy(), Strategy::Fallback);

        engine.detect(&frame());
        engine.detect(&frame());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_model_regions_are_clamped_to_frame() {
        let detector = FixedDetector(vec![Region::new(-5, -5, 500, 500, "car", 0.6)]);
        let mut engine = DetectionEngine::new(Some(Arc::new(detector)), &MotionSettings::default());
        let r = &engine.detect(&frame()).regions[0];
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (0, 0, 64, 48));
    }

    #[test]
    fn test_grey_frames_are_analysed_and_annotated_in_rgb() {
        let grey = Frame::new(vec![30; 64 * 48], 64, 48, 1, 0);

        let detector = FixedDetector(vec![Region::new(10, 10, 40, 40, "person", 0.8)]);
        let mut model = DetectionEngine::new(Some(Arc::new(detector)), &MotionSettings::default());
        let result = model.detect(&grey);
        assert_eq!(result.strategy, Strategy::Model);
        assert_eq!(result.annotated.channels(), 3);
        assert_eq!(result.annotated.as_ndarray()[[10, 10, 0]], MODEL_BOX_COLOR[0]);
        assert!(result.annotated.to_rgb_image().is_some());

        let mut fallback = DetectionEngine::new(None, &MotionSettings::default());
        for _ in 0..3 {
            let result = fallback.detect(&grey);
            assert_eq!(result.strategy, Strategy::Fallback);
            assert_eq!(result.annotated.channels(), 3);
            assert_eq!(result.annotated.as_ndarray()[[20, 20, 1]], 30);
        }
    }
}
