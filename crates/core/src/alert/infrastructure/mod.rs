pub mod bell_notifier;
pub mod jpeg_snapshot_writer;
pub mod log_notifier;
