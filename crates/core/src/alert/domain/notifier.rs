use thiserror::Error;

use crate::alert::domain::alert_event::AlertEvent;

#[derive(Error, Debug)]
#[error("notification via {channel} failed: {reason}")]
pub struct NotifyError {
    pub channel: &'static str,
    pub reason: String,
}

/// Delivers an alert to a person or system.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;
}

/// Fans an alert out to several notifiers. Every notifier is tried; the
/// first failure is reported.
pub struct CompositeNotifier {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

impl Notifier for CompositeNotifier {
    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let mut first_error = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
