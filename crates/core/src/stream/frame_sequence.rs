use crossbeam_channel::Receiver;

use crate::shared::constants::STREAM_CONTENT_TYPE;

/// Lazy, unbounded sequence of multipart chunks for one session.
///
/// Each `next` blocks until the session produces its next frame. The
/// sequence ends when the session's source ends or the session is stopped,
/// and cannot be restarted. Dropping it tells the session to stop encoding.
pub struct FrameSequence {
    receiver: Receiver<Vec<u8>>,
}

impl FrameSequence {
    pub(crate) fn new(receiver: Receiver<Vec<u8>>) -> Self {
        Self { receiver }
    }

    /// MIME type to announce for the concatenated chunks.
    pub fn content_type(&self) -> &'static str {
        STREAM_CONTENT_TYPE
    }
}

impl Iterator for FrameSequence {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}
