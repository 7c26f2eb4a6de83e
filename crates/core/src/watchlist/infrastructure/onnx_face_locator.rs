/// YOLO face locator using ONNX Runtime.
///
/// Expects a single-class face model whose rows are `cx, cy, w, h, score`
/// optionally followed by keypoints, which are ignored.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::onnx_runtime::build_session;
use crate::detection::infrastructure::yolo::{self, NMS_IOU_THRESH};
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::watchlist::domain::face_locator::FaceLocator;

pub const FACE_LABEL: &str = "face";

pub struct OnnxFaceLocator {
    session: Mutex<ort::session::Session>,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceLocator {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        let input_size = yolo::input_size(&session);
        log::info!("Loaded face model {} ({input_size}px input)", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
            confidence,
            input_size,
        })
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
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
                return Err("Face model produced no outputs".into());
            }
            let tensor = outputs[0].try_extract_array::<f32>()?;
            let shape = tensor.shape().to_vec();
            let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
            yolo::decode_output(data, &shape, &geometry, self.confidence, Some(1))?
        };

        Ok(yolo::nms(candidates, NMS_IOU_THRESH)
            .into_iter()
            .map(|d| {
                Region::new(
                    d.x1.round() as i32,
                    d.y1.round() as i32,
                    d.x2.round() as i32,
                    d.y2.round() as i32,
                    FACE_LABEL,
                    d.confidence as f32,
                )
                .clamped(frame.width(), frame.height())
            })
            .filter(|r| r.area() > 0)
            .collect())
    }
}
