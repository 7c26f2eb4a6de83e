use std::fmt;

use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Which analysis produced a [`DetectionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Model,
    Fallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Model => f.write_str("model"),
            Strategy::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Copy of the input frame with region boxes and captions drawn in.
    pub annotated: Frame,
    pub anomaly: bool,
    pub regions: Vec<Region>,
    pub strategy: Strategy,
}
