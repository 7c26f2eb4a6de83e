use std::collections::VecDeque;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::FrameSource;

/// Replays pre-built frames, re-indexed in the order given.
///
/// Used for synthetic feeds and for driving pipelines in tests.
pub struct MemoryFrameSource {
    metadata: VideoMetadata,
    frames: VecDeque<Frame>,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Frame>, fps: f64) -> Self {
        let (width, height) = frames
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));
        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames: frames.len(),
            codec: "rawvideo".to_string(),
        };
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.with_index(i))
            .collect();
        Self { metadata, frames }
    }
}

impl FrameSource for MemoryFrameSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_frames_with_sequential_indices() {
        let frames = vec![
            Frame::filled(4, 4, [1, 1, 1], 9),
            Frame::filled(4, 4, [2, 2, 2], 9),
        ];
        let mut source = MemoryFrameSource::new(frames, 25.0);
        assert_eq!(source.metadata().total_frames, 2);
        assert_eq!(source.read().unwrap().index(), 0);
        assert_eq!(source.read().unwrap().index(), 1);
        assert!(source.read().is_none());
    }

    #[test]
    fn test_empty_source_ends_immediately() {
        let mut source = MemoryFrameSource::new(Vec::new(), 25.0);
        assert_eq!(source.metadata().width, 0);
        assert!(source.read().is_none());
    }

    #[test]
    fn test_close_drops_remaining_frames() {
        let mut source = MemoryFrameSource::new(vec![Frame::filled(2, 2, [0, 0, 0], 0); 3], 25.0);
        source.close();
        assert!(source.read().is_none());
    }
}
