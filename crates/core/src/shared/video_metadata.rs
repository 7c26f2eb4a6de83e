/// Stream properties reported by a frame source once opened.
///
/// `total_frames` is 0 for live sources and for containers that do not
/// declare a frame count.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
}

impl VideoMetadata {
    pub fn is_unbounded(&self) -> bool {
        self.total_frames == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction() {
        let meta = VideoMetadata {
            width: 1920,
            height: 1080,
            fps: 30.0,
            total_frames: 900,
            codec: "h264".to_string(),
        };
        assert_eq!(meta.width, 1920);
        assert_eq!(meta.total_frames, 900);
        assert!(!meta.is_unbounded());
    }

    #[test]
    fn test_live_metadata_is_unbounded() {
        let meta = VideoMetadata {
            width: 640,
            height: 480,
            fps: 25.0,
            total_frames: 0,
            codec: "rawvideo".to_string(),
        };
        assert!(meta.is_unbounded());
    }
}
