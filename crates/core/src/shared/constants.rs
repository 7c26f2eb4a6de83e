/// Reference image extensions accepted in the watchlist directory.
pub const WATCHLIST_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Still-image extensions opened without ffmpeg.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Multipart boundary token used by the live stream.
pub const STREAM_BOUNDARY: &str = "frame";

/// MIME type announced to stream consumers.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

pub const DEFAULT_AREA_THRESHOLD: u32 = 800;
pub const DEFAULT_MOTION_HISTORY: u32 = 120;
pub const DEFAULT_VAR_THRESHOLD: f32 = 32.0;
pub const DEFAULT_WARMUP_FRAMES: u32 = 2;

pub const DEFAULT_MATCH_TOLERANCE: f64 = 0.6;

pub const DEFAULT_DETECTION_CONFIDENCE: f64 = 0.25;
pub const DEFAULT_FACE_CONFIDENCE: f64 = 0.5;

pub const DEFAULT_ALERT_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_ALERT_JOURNAL_CAPACITY: usize = 256;

/// Face detector used for watchlist matching when none is configured.
pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// ArcFace embedding model used for watchlist matching when none is configured.
pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";
