use std::path::PathBuf;

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("failed to store snapshot at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(String),
}

/// Persists the raw frame behind an alert.
pub trait SnapshotWriter: Send {
    /// Writes `frame` and returns where it landed. Never overwrites an
    /// existing snapshot.
    fn persist(
        &self,
        session_id: &str,
        frame: &Frame,
        timestamp: &DateTime<Local>,
    ) -> Result<PathBuf, AlertError>;
}
