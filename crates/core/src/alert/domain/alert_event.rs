use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};

/// Which analysis stage raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Anomaly,
    WatchlistMatch,
    Both,
}

impl TriggerReason {
    pub fn from_flags(anomaly: bool, watchlist_match: bool) -> Option<Self> {
        match (anomaly, watchlist_match) {
            (true, true) => Some(TriggerReason::Both),
            (true, false) => Some(TriggerReason::Anomaly),
            (false, true) => Some(TriggerReason::WatchlistMatch),
            (false, false) => None,
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerReason::Anomaly => "anomaly",
            TriggerReason::WatchlistMatch => "watchlist-match",
            TriggerReason::Both => "anomaly+watchlist-match",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub session_id: String,
    pub timestamp: DateTime<Local>,
    /// `None` when the snapshot could not be written.
    pub snapshot_path: Option<PathBuf>,
    pub reason: TriggerReason,
}
