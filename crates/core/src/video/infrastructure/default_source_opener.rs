use std::path::Path;

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::video::domain::frame_source::{FrameSource, SourceError, SourceOpener};
use crate::video::domain::source_spec::SourceSpec;
use crate::video::infrastructure::ffmpeg_source::FfmpegFrameSource;
use crate::video::infrastructure::image_file_source::ImageFileSource;

/// Routes still images to [`ImageFileSource`] and everything else to
/// ffmpeg.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSourceOpener;

impl SourceOpener for DefaultSourceOpener {
    fn open(&self, spec: &SourceSpec) -> Result<Box<dyn FrameSource>, SourceError> {
        match spec {
            SourceSpec::File(path) if is_still_image(path) => {
                Ok(Box::new(ImageFileSource::open(path)?))
            }
            _ => Ok(Box::new(FfmpegFrameSource::open(spec)?)),
        }
    }
}

fn is_still_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a.jpg", true)]
    #[case("a.JPEG", true)]
    #[case("a.webp", true)]
    #[case("a.mp4", false)]
    #[case("noext", false)]
    fn test_is_still_image(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_still_image(Path::new(name)), expected);
    }

    #[test]
    fn test_opens_still_image_without_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        image::RgbImage::from_pixel(6, 4, image::Rgb([9, 9, 9]))
            .save(&path)
            .unwrap();
        let mut source = DefaultSourceOpener.open(&SourceSpec::File(path)).unwrap();
        assert_eq!(source.metadata().total_frames, 1);
        assert!(source.read().is_some());
        assert!(source.read().is_none());
    }

    #[test]
    fn test_missing_video_is_unavailable() {
        let spec = SourceSpec::File("/nonexistent/feed.mp4".into());
        assert!(DefaultSourceOpener.open(&spec).is_err());
    }
}
