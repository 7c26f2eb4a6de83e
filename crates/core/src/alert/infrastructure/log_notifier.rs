use crate::alert::domain::alert_event::AlertEvent;
use crate::alert::domain::notifier::{Notifier, NotifyError};

/// Reports alerts as warn-level log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let snapshot = event
            .snapshot_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<not saved>".to_string());
        log::warn!(
            "ALERT session={} reason={} at {} snapshot={snapshot}",
            event.session_id,
            event.reason,
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        );
        Ok(())
    }
}
