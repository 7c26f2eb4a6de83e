use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, SourceError};
use crate::video::domain::source_spec::SourceSpec;

/// Serves a still image as a one-frame stream.
pub struct ImageFileSource {
    metadata: VideoMetadata,
    frame: Option<Frame>,
}

impl ImageFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let spec = SourceSpec::File(path.to_path_buf());
        let image = image::open(path)
            .map_err(|e| SourceError::unavailable(&spec, e))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SourceError::unavailable(&spec, "image has zero dimensions"));
        }

        let format = image::ImageFormat::from_path(path)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or_default();

        Ok(Self {
            metadata: VideoMetadata {
                width,
                height,
                fps: 0.0,
                total_frames: 1,
                codec: format.to_string(),
            },
            frame: Some(Frame::from_rgb_image(image, 0)),
        })
    }
}

impl FrameSource for ImageFileSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read(&mut self) -> Option<Frame> {
        self.frame.take()
    }

    fn close(&mut self) {
        self.frame = None;
    }
}
