use image::codecs::jpeg::JpegEncoder;

use crate::shared::constants::STREAM_BOUNDARY;
use crate::shared::frame::Frame;

/// Serializes annotated frames into `multipart/x-mixed-replace` parts.
#[derive(Debug, Clone, Copy)]
pub struct MjpegEncoder {
    quality: u8,
}

impl MjpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>, image::ImageError> {
        let image = frame.to_rgb_image().ok_or_else(|| {
            image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            ))
        })?;
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&image)?;
        Ok(jpeg)
    }

    /// Wraps one JPEG payload as a multipart part: boundary line, content
    /// type header, blank line, payload, trailing CRLF.
    pub fn chunk(jpeg: &[u8]) -> Vec<u8> {
        let header = format!("--{STREAM_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
        let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
        part.extend_from_slice(header.as_bytes());
        part.extend_from_slice(jpeg);
        part.extend_from_slice(b"\r\n");
        part
    }

    pub fn encode_chunk(&self, frame: &Frame) -> Result<Vec<u8>, image::ImageError> {
        Ok(Self::chunk(&self.encode(frame)?))
    }
}
