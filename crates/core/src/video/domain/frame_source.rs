use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::source_spec::SourceSpec;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source {spec} is unavailable: {reason}")]
    Unavailable { spec: String, reason: String },
}

impl SourceError {
    pub fn unavailable(spec: &SourceSpec, reason: impl ToString) -> Self {
        SourceError::Unavailable {
            spec: spec.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// An opened producer of frames.
///
/// `read` returns `None` once the source is exhausted or fails, and keeps
/// returning `None` afterwards. Sources are never retried.
pub trait FrameSource: Send {
    fn metadata(&self) -> &VideoMetadata;

    /// Next frame in decode order.
    fn read(&mut self) -> Option<Frame>;

    /// Releases the underlying device or file. Safe to call repeatedly.
    fn close(&mut self);
}

/// Opens frame sources from descriptors.
pub trait SourceOpener: Send + Sync {
    fn open(&self, spec: &SourceSpec) -> Result<Box<dyn FrameSource>, SourceError>;
}
