use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Finds faces in a frame, most confident first.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
