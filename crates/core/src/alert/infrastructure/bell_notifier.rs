use std::io::Write;

use crate::alert::domain::alert_event::AlertEvent;
use crate::alert::domain::notifier::{Notifier, NotifyError};

/// Rings the terminal bell on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct BellNotifier;

impl Notifier for BellNotifier {
    fn notify(&self, _event: &AlertEvent) -> Result<(), NotifyError> {
        let mut stderr = std::io::stderr().lock();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| NotifyError {
                channel: "bell",
                reason: e.to_string(),
            })
    }
}
