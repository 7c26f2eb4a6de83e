use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Locates labelled objects in a frame.
///
/// Implementations are shared between sessions, so they take `&self` and
/// serialize any internal state themselves.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
