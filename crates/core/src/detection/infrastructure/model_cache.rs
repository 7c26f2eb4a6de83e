use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::detection::domain::model_ref::ModelRef;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::detection::infrastructure::onnx_object_detector::OnnxObjectDetector;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("failed to load model {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Builds a detector for a model reference at the given confidence.
pub type ModelLoader =
    Box<dyn Fn(&ModelRef, f64) -> Result<Arc<dyn ObjectDetector>, ModelLoadError> + Send + Sync>;

type Slot = Arc<Mutex<Option<Arc<dyn ObjectDetector>>>>;

/// Process-wide cache of loaded detection models keyed by path.
///
/// Loading the same path is mutually exclusive: a second caller waits for
/// the first load and then shares its result. Different paths load in
/// parallel. Failed loads are not cached, so a model dropped into place
/// later is picked up by the next session.
pub struct ModelCache {
    slots: Mutex<HashMap<PathBuf, Slot>>,
    loader: ModelLoader,
    confidence: f64,
}

impl ModelCache {
    pub fn new(loader: ModelLoader, confidence: f64) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            loader,
            confidence,
        }
    }

    /// Cache backed by [`OnnxObjectDetector`].
    pub fn onnx(confidence: f64) -> Self {
        Self::new(Box::new(load_onnx), confidence)
    }

    pub fn get(&self, model: &ModelRef) -> Result<Arc<dyn ObjectDetector>, ModelLoadError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(model.path.clone()).or_default().clone()
        };

        let mut loaded = slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(detector) = loaded.as_ref() {
            return Ok(Arc::clone(detector));
        }

        let detector = (self.loader)(model, self.confidence)?;
        *loaded = Some(Arc::clone(&detector));
        Ok(detector)
    }

    /// Like [`ModelCache::get`], but logs the failure and yields `None` so
    /// the caller can run without a model.
    pub fn get_or_log(&self, model: &ModelRef) -> Option<Arc<dyn ObjectDetector>> {
        match self.get(model) {
            Ok(detector) => Some(detector),
            Err(e) => {
                log::warn!("{e}; using motion detection");
                None
            }
        }
    }

    pub fn loaded_count(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .values()
            .filter(|slot| slot.lock().map(|s| s.is_some()).unwrap_or(false))
            .count()
    }
}

fn load_onnx(model: &ModelRef, confidence: f64) -> Result<Arc<dyn ObjectDetector>, ModelLoadError> {
    if !model.path.is_file() {
        return Err(ModelLoadError::Missing(model.path.clone()));
    }
    let detector = OnnxObjectDetector::new(model, confidence).map_err(|e| ModelLoadError::Load {
        path: model.path.clone(),
        reason: e.to_string(),
    })?;
    Ok(Arc::new(detector))
}
