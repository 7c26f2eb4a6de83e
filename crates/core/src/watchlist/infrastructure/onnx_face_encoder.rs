/// ArcFace embedding encoder using ONNX Runtime.
///
/// Crops are resized to 112×112, normalised to [-1, 1] and embedded; the
/// embedding is L2-normalised so Euclidean distance tracks cosine distance.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::onnx_runtime::build_session;
use crate::shared::frame::Frame;
use crate::watchlist::domain::face_encoder::{l2_normalize, FaceEncoder};

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;
const DEFAULT_DIMENSION: usize = 512;

pub struct OnnxFaceEncoder {
    session: Mutex<ort::session::Session>,
    dimension: usize,
}

impl OnnxFaceEncoder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        let dimension = session
            .outputs()
            .first()
            .and_then(|output| match output.dtype() {
                ort::value::ValueType::Tensor { shape, .. } => {
                    shape.last().copied().filter(|&d| d > 0).map(|d| d as usize)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_DIMENSION);
        log::info!("Loaded face embedding model {} ({dimension}-d)", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
            dimension,
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(&self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let tensor = preprocess(face);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let mut embedding = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?
            .to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Nearest-neighbour resize to 112×112, normalise, NCHW.
fn preprocess(face: &Frame) -> ndarray::Array4<f32> {
    let src_w = face.width() as usize;
    let src_h = face.height() as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    if src_w == 0 || src_h == 0 {
        return tensor;
    }
    let src = face.as_ndarray();

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (src[[src_y, src_x, c]] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }
    tensor
}
