use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::alert::domain::alert_event::{AlertEvent, TriggerReason};
use crate::alert::domain::notifier::Notifier;
use crate::alert::domain::snapshot_writer::SnapshotWriter;
use crate::shared::frame::Frame;

struct AlertJob {
    session_id: String,
    frame: Frame,
    reason: TriggerReason,
    timestamp: DateTime<Local>,
}

/// Counts alerts that have left the queue, either processed or dropped.
#[derive(Default)]
struct Settled {
    count: Mutex<u64>,
    changed: Condvar,
}

impl Settled {
    fn add(&self, n: u64) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count += n;
        self.changed.notify_all();
    }

    fn wait_for(&self, target: u64) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count < target {
            count = self.changed.wait(count).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Persists alert snapshots and sends notifications off the caller's thread.
///
/// `dispatch` never blocks: alerts go into a bounded queue drained by one
/// worker, and when the queue is full the oldest pending alert is dropped
/// to make room. The worker writes the snapshot, then notifies whether or
/// not the write succeeded, then records the event in a bounded journal.
pub struct AlertDispatcher {
    sender: Option<Sender<AlertJob>>,
    overflow: Receiver<AlertJob>,
    submitted: AtomicU64,
    dropped: AtomicU64,
    settled: Arc<Settled>,
    journal: Arc<Mutex<VecDeque<AlertEvent>>>,
    worker: Option<JoinHandle<()>>,
}

impl AlertDispatcher {
    pub fn new(
        writer: Box<dyn SnapshotWriter>,
        notifier: Box<dyn Notifier>,
        queue_capacity: usize,
        journal_capacity: usize,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded::<AlertJob>(queue_capacity.max(1));
        let settled = Arc::new(Settled::default());
        let journal = Arc::new(Mutex::new(VecDeque::with_capacity(journal_capacity)));

        let worker = {
            let receiver = receiver.clone();
            let settled = Arc::clone(&settled);
            let journal = Arc::clone(&journal);
            std::thread::Builder::new()
                .name("alert-dispatcher".into())
                .spawn(move || {
                    for job in receiver.iter() {
                        let event = process(writer.as_ref(), notifier.as_ref(), job);
                        record(&journal, journal_capacity, event);
                        settled.add(1);
                    }
                })
        };
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to start alert worker: {e}");
                None
            }
        };

        Self {
            sender: worker.as_ref().map(|_| sender),
            overflow: receiver,
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            settled,
            journal,
            worker,
        }
    }

    /// Queues an alert for `frame`, stamped with the current local time.
    pub fn dispatch(&self, session_id: &str, frame: Frame, reason: TriggerReason) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let mut job = AlertJob {
            session_id: session_id.to_string(),
            frame,
            reason,
            timestamp: Local::now(),
        };

        let Some(sender) = self.sender.as_ref() else {
            log::error!("Alert for session {session_id} discarded: no alert worker");
            self.discard(1);
            return;
        };

        loop {
            match sender.try_send(job) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    job = rejected;
                    if let Ok(oldest) = self.overflow.try_recv() {
                        log::warn!(
                            "Alert queue full; dropping pending alert for session {}",
                            oldest.session_id
                        );
                        self.discard(1);
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::error!("Alert for session {session_id} discarded: alert worker stopped");
                    self.discard(1);
                    return;
                }
            }
        }
    }

    /// Blocks until every alert dispatched before this call has been
    /// processed or dropped.
    pub fn flush(&self) {
        let target = self.submitted.load(Ordering::SeqCst);
        self.settled.wait_for(target);
    }

    /// Most recent alerts, oldest first.
    pub fn recent(&self) -> Vec<AlertEvent> {
        let journal = self.journal.lock().unwrap_or_else(|e| e.into_inner());
        journal.iter().cloned().collect()
    }

    /// Alerts discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    fn discard(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::SeqCst);
        self.settled.add(n);
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Alert worker panicked");
            }
        }
    }
}

fn process(writer: &dyn SnapshotWriter, notifier: &dyn Notifier, job: AlertJob) -> AlertEvent {
    let snapshot_path = match writer.persist(&job.session_id, &job.frame, &job.timestamp) {
        Ok(path) => Some(path),
        Err(e) => {
            log::error!("Alert snapshot for session {} not saved: {e}", job.session_id);
            None
        }
    };

    let event = AlertEvent {
        session_id: job.session_id,
        timestamp: job.timestamp,
        snapshot_path,
        reason: job.reason,
    };
    if let Err(e) = notifier.notify(&event) {
        log::error!("{e}");
    }
    event
}

fn record(journal: &Mutex<VecDeque<AlertEvent>>, capacity: usize, event: AlertEvent) {
    if capacity == 0 {
        return;
    }
    let mut journal = journal.lock().unwrap_or_else(|e| e.into_inner());
    while journal.len() >= capacity {
        journal.pop_front();
    }
    journal.push_back(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::alert::domain::notifier::NotifyError;
    use crate::alert::domain::snapshot_writer::AlertError;
    use crate::alert::infrastructure::jpeg_snapshot_writer::JpegSnapshotWriter;

    /// Sleeps before each write so the queue can back up; optionally fails.
    struct SlowWriter {
        delay: Duration,
        fail: bool,
    }

    impl SnapshotWriter for SlowWriter {
        fn persist(
            &self,
            session_id: &str,
            _frame: &Frame,
            _timestamp: &DateTime<Local>,
        ) -> Result<PathBuf, AlertError> {
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(AlertError::Encode("disk full".into()));
            }
            Ok(PathBuf::from(format!("{session_id}.jpg")))
        }
    }

    struct CountingNotifier(Arc<AtomicUsize>);

    impl Notifier for CountingNotifier {
        fn notify(&self, _event: &AlertEvent) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn frame() -> Frame {
        Frame::filled(8, 8, [100, 100, 100], 0)
    }

    #[test]
    fn test_dispatch_persists_notifies_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let notified = Arc::new(AtomicUsize::new(0));
        let dispatcher = AlertDispatcher::new(
            Box::new(JpegSnapshotWriter::new(dir.path(), 90)),
            Box::new(CountingNotifier(notified.clone())),
            8,
            16,
        );

        dispatcher.dispatch("alice", frame(), TriggerReason::Anomaly);
        dispatcher.flush();

        let events = dispatcher.recent();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id, "alice");
        assert_eq!(events[0].reason, TriggerReason::Anomaly);
        assert!(events[0].snapshot_path.as_ref().unwrap().exists());
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_persistence_still_notifies() {
        let notified = Arc::new(AtomicUsize::new(0));
        let dispatcher = AlertDispatcher::new(
            Box::new(SlowWriter {
                delay: Duration::ZERO,
                fail: true,
            }),
            Box::new(CountingNotifier(notified.clone())),
            8,
            16,
        );

        dispatcher.dispatch("bob", frame(), TriggerReason::WatchlistMatch);
        dispatcher.flush();

        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.recent()[0].snapshot_path, None);
    }

    #[test]
    fn test_saturated_queue_drops_oldest() {
        let dispatcher = AlertDispatcher::new(
            Box::new(SlowWriter {
                delay: Duration::from_millis(100),
                fail: false,
            }),
            Box::new(CountingNotifier(Arc::new(AtomicUsize::new(0)))),
            2,
            64,
        );

        for i in 0..10 {
            dispatcher.dispatch(&format!("s{i}"), frame(), TriggerReason::Anomaly);
        }
        dispatcher.flush();

        let processed = dispatcher.recent();
        assert!(dispatcher.dropped() > 0);
        assert_eq!(processed.len() as u64 + dispatcher.dropped(), 10);
        // The newest alert always survives.
        assert_eq!(processed.last().unwrap().session_id, "s9");
    }

    #[test]
    fn test_journal_is_bounded() {
        let dispatcher = AlertDispatcher::new(
            Box::new(SlowWriter {
                delay: Duration::ZERO,
                fail: false,
            }),
            Box::new(CountingNotifier(Arc::new(AtomicUsize::new(0)))),
            64,
            3,
        );
        for i in 0..5 {
            dispatcher.dispatch(&format!("s{i}"), frame(), TriggerReason::Both);
            dispatcher.flush();
        }
        let ids: Vec<_> = dispatcher.recent().into_iter().map(|e| e.session_id).collect();
        assert_eq!(ids, vec!["s2", "s3", "s4"]);
    }

    #[test]
    fn test_flush_with_nothing_pending_returns() {
        let dispatcher = AlertDispatcher::new(
            Box::new(SlowWriter {
                delay: Duration::ZERO,
                fail: false,
            }),
            Box::new(CountingNotifier(Arc::new(AtomicUsize::new(0)))),
            4,
            4,
        );
        dispatcher.flush();
        assert!(dispatcher.recent().is_empty());
        assert_eq!(dispatcher.dropped(), 0);
    }
}
