pub mod model_cache;
pub mod onnx_object_detector;
pub(crate) mod onnx_runtime;
pub mod yolo;
