use std::sync::Mutex;

use crate::detection::domain::model_ref::ModelRef;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::onnx_runtime::build_session;
use super::yolo::{self, NMS_IOU_THRESH};

/// Multi-class YOLO detector backed by an ONNX Runtime session.
///
/// The session needs exclusive access to run, so concurrent callers queue
/// on its mutex.
pub struct OnnxObjectDetector {
    session: Mutex<ort::session::Session>,
    model: ModelRef,
    confidence: f64,
    input_size: u32,
}

impl OnnxObjectDetector {
    pub fn new(model: &ModelRef, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(&model.path)?;
        let input_size = yolo::input_size(&session);
        log::info!(
            "Loaded detection model {} ({input_size}px input, {} labels)",
            model.path.display(),
            model.labels.len()
        );
        Ok(Self {
            session: Mutex::new(session),
            model: model.clone(),
            confidence,
            input_size,
        })
    }
}

impl ObjectDetector for OnnxObjectDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let (input_tensor, geometry) = yolo::letterbox(frame, self.input_size);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;

        let candidates = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| format!("Lock poisoned: {e}"))?;
            let outputs = session.run(ort::inputs![input_value])?;
            if outputs.len() == 0 {
                return Err("Detection model produced no outputs".into());
            }
            let tensor = outputs[0].try_extract_array::<f32>()?;
            let shape = tensor.shape().to_vec();
            let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
            yolo::decode_output(data, &shape, &geometry, self.confidence, None)?
        };

        Ok(yolo::nms(candidates, NMS_IOU_THRESH)
            .into_iter()
            .map(|d| {
                Region::new(
                    d.x1.round() as i32,
                    d.y1.round() as i32,
                    d.x2.round() as i32,
                    d.y2.round() as i32,
                    self.model.label_for(d.class_id),
                    d.confidence as f32,
                )
                .clamped(frame.width(), frame.height())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_fails_to_load() {
        let model = ModelRef::new("/nonexistent/model.onnx");
        assert!(OnnxObjectDetector::new(&model, 0.25).is_err());
    }

    #[test]
    fn test_garbage_model_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();
        assert!(OnnxObjectDetector::new(&ModelRef::new(path), 0.25).is_err());
    }
}
