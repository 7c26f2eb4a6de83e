use std::sync::Arc;

use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::watchlist::domain::face_encoder::FaceEncoder;
use crate::watchlist::domain::face_locator::FaceLocator;

/// Pairs a locator with an encoder: frame in, one vector per face out.
pub struct FaceAnalyzer {
    locator: Arc<dyn FaceLocator>,
    encoder: Arc<dyn FaceEncoder>,
}

impl FaceAnalyzer {
    pub fn new(locator: Arc<dyn FaceLocator>, encoder: Arc<dyn FaceEncoder>) -> Self {
        Self { locator, encoder }
    }

    /// Encodings of every face in `frame`, in locator order. Faces whose
    /// crop is empty are skipped.
    pub fn encodings(&self, frame: &Frame) -> Result<Vec<Vec<f32>>, Box<dyn std::error::Error>> {
        let faces = self.locator.locate(frame)?;
        let mut encodings = Vec::with_capacity(faces.len());
        for face in &faces {
            let crop = square_crop(frame, face);
            if crop.width() == 0 || crop.height() == 0 {
                continue;
            }
            encodings.push(self.encoder.encode(&crop)?);
        }
        Ok(encodings)
    }

    /// Encoding of the first face in `frame`, if any.
    pub fn first_encoding(&self, frame: &Frame) -> Result<Option<Vec<f32>>, Box<dyn std::error::Error>> {
        Ok(self.encodings(frame)?.into_iter().next())
    }
}

/// Square crop centred on the region, clamped to the frame.
fn square_crop(frame: &Frame, region: &Region) -> Frame {
    let cx = (region.x1 + region.x2) / 2;
    let cy = (region.y1 + region.y2) / 2;
    let half = region.width().max(region.height()) / 2;
    frame.crop(cx - half, cy - half, cx + half, cy + half)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLocator(Vec<Region>);

    impl FaceLocator for FixedLocator {
        fn locate(&self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    /// Encodes a crop as its (width, height).
    struct SizeEncoder;

    impl FaceEncoder for SizeEncoder {
        fn encode(&self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
            Ok(vec![face.width() as f32, face.height() as f32])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn analyzer(faces: Vec<Region>) -> FaceAnalyzer {
        FaceAnalyzer::new(Arc::new(FixedLocator(faces)), Arc::new(SizeEncoder))
    }

    #[test]
    fn test_crops_are_square() {
        let frame = Frame::filled(100, 100, [0, 0, 0], 0);
        let a = analyzer(vec![Region::new(20, 30, 40, 70, "face", 0.9)]);
        assert_eq!(a.encodings(&frame).unwrap(), vec![vec![40.0, 40.0]]);
    }

    #[test]
    fn test_crop_is_clamped_at_frame_edge() {
        let frame = Frame::filled(50, 50, [0, 0, 0], 0);
        let a = analyzer(vec![Region::new(0, 0, 20, 20, "face", 0.9)]);
        assert_eq!(a.encodings(&frame).unwrap(), vec![vec![20.0, 20.0]]);
    }

    #[test]
    fn test_no_faces_gives_no_encodings() {
        let frame = Frame::filled(10, 10, [0, 0, 0], 0);
        let a = analyzer(Vec::new());
        assert!(a.encodings(&frame).unwrap().is_empty());
        assert!(a.first_encoding(&frame).unwrap().is_none());
    }

    #[test]
    fn test_degenerate_face_is_skipped() {
        let frame = Frame::filled(10, 10, [0, 0, 0], 0);
        let a = analyzer(vec![Region::new(50, 50, 60, 60, "face", 0.9)]);
        assert!(a.encodings(&frame).unwrap().is_empty());
    }
}
