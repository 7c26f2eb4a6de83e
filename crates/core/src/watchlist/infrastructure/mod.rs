pub mod histogram_face_encoder;
pub mod onnx_face_encoder;
pub mod onnx_face_locator;
