use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{SendTimeoutError, Sender};
use thiserror::Error;

use crate::detection::domain::model_ref::ModelRef;
use crate::pipeline::frame_pipeline::{FramePipeline, PipelineContext};
use crate::pipeline::pipeline_logger::LogPipelineLogger;
use crate::session::monitor_session::Session;
use crate::stream::mjpeg_encoder::MjpegEncoder;
use crate::video::domain::frame_source::{FrameSource, SourceError, SourceOpener};
use crate::video::domain::source_spec::SourceSpec;

/// How often a worker blocked on a slow consumer checks for a stop.
const STOP_POLL: Duration = Duration::from_millis(100);
const PROGRESS_EVERY: usize = 300;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),
    #[error("no session with id {0}")]
    NotFound(String),
    #[error("stream for session {0} is already being consumed")]
    StreamClaimed(String),
}

type SessionMap = Arc<RwLock<HashMap<String, Arc<Session>>>>;
type Lane = Arc<Mutex<()>>;

/// Owns the id → session mapping and the worker thread behind each entry.
///
/// Starts and stops on one id are serialized by that id's lane, so a
/// replaced session is fully shut down, source closed, before the new source
/// is opened. Lanes of different ids never wait on each other: the
/// registry-wide locks are only held to look up a lane or to edit the map,
/// never while a worker is joined or a source is opened. Lookups only take
/// the map's read lock.
pub struct SessionRegistry {
    sessions: SessionMap,
    lanes: Mutex<HashMap<String, Lane>>,
    opener: Arc<dyn SourceOpener>,
    context: PipelineContext,
    encoder: MjpegEncoder,
}

impl SessionRegistry {
    pub fn new(opener: Arc<dyn SourceOpener>, context: PipelineContext, stream_quality: u8) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            lanes: Mutex::new(HashMap::new()),
            opener,
            context,
            encoder: MjpegEncoder::new(stream_quality),
        }
    }

    pub fn start(
        &self,
        id: &str,
        spec: SourceSpec,
        model: Option<ModelRef>,
    ) -> Result<Arc<Session>, SessionError> {
        self.in_lane(id, || {
            let previous = self.write_map().remove(id);
            if let Some(previous) = previous {
                log::info!("Replacing session {id}");
                previous.shutdown();
            }
            self.launch(id, spec, model)
        })
    }

    pub fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.read_map()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub fn stop(&self, id: &str) -> Result<(), SessionError> {
        self.in_lane(id, || {
            let session = self
                .write_map()
                .remove(id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            session.shutdown();
            log::info!("Session {id} stopped");
            Ok(())
        })
    }

    /// Ids of live sessions, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.read_map().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stop_all(&self) {
        for id in self.ids() {
            match self.stop(&id) {
                Ok(()) | Err(SessionError::NotFound(_)) => {}
                Err(e) => log::warn!("Failed to stop session {id}: {e}"),
            }
        }
    }

    /// Opens the source and spawns the worker. The caller holds the lane.
    fn launch(
        &self,
        id: &str,
        spec: SourceSpec,
        model: Option<ModelRef>,
    ) -> Result<Arc<Session>, SessionError> {
        let source = self.opener.open(&spec)?;
        log::info!(
            "Session {id} opened {spec} ({}x{} @ {:.1} fps)",
            source.metadata().width,
            source.metadata().height,
            source.metadata().fps
        );

        let pipeline = self.context.pipeline(
            id,
            model.as_ref(),
            Box::new(LogPipelineLogger::new(id, PROGRESS_EVERY)),
        );
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let session = Arc::new(Session::new(id, spec, model, receiver));
        self.write_map().insert(id.to_string(), Arc::clone(&session));

        let worker = SessionWorker {
            session: Arc::clone(&session),
            source,
            pipeline,
            encoder: self.encoder,
            consumer: Some(sender),
            sessions: Arc::clone(&self.sessions),
        };
        match std::thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || worker.run())
        {
            Ok(handle) => session.attach_worker(handle),
            Err(e) => {
                self.write_map().remove(id);
                session.mark_closed();
                return Err(SourceError::Unavailable {
                    spec: session.spec().to_string(),
                    reason: format!("failed to start worker: {e}"),
                }
                .into());
            }
        }

        Ok(session)
    }

    /// Runs `f` holding the lane for `id`. The lane is dropped from the
    /// table once nobody else is queued on it.
    fn in_lane<R>(&self, id: &str, f: impl FnOnce() -> R) -> R {
        let lane = Arc::clone(self.lock_lanes().entry(id.to_string()).or_default());
        let result = {
            let _held = lane.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };

        let mut lanes = self.lock_lanes();
        let idle = lanes
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, &lane) && Arc::strong_count(current) == 2);
        if idle {
            lanes.remove(id);
        }
        result
    }

    fn lock_lanes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Lane>> {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

enum Delivery {
    Sent,
    Disconnected,
    Stopped,
}

/// Read → detect → match → alert → encode loop for one session.
struct SessionWorker {
    session: Arc<Session>,
    source: Box<dyn FrameSource>,
    pipeline: FramePipeline,
    encoder: MjpegEncoder,
    consumer: Option<Sender<Vec<u8>>>,
    sessions: SessionMap,
}

impl SessionWorker {
    fn run(mut self) {
        let total = self.source.metadata().total_frames;
        while !self.session.stop_requested() {
            let Some(frame) = self.source.read() else {
                log::info!("Session {} reached end of stream", self.session.id());
                break;
            };
            self.session.record_frame(&frame);
            let outcome = self.pipeline.process(&frame, total);

            if self.consumer.is_none() || !self.session.stream_claimed() {
                continue;
            }
            let t = Instant::now();
            let chunk = match self.encoder.encode_chunk(&outcome.detection.annotated) {
                Ok(chunk) => chunk,
                Err(e) => {
                    log::warn!("Session {}: failed to encode frame: {e}", self.session.id());
                    continue;
                }
            };
            self.pipeline
                .record_timing("encode", t.elapsed().as_secs_f64() * 1000.0);
            match self.deliver(chunk) {
                Delivery::Sent => {}
                Delivery::Stopped => break,
                Delivery::Disconnected => {
                    log::info!(
                        "Stream consumer for session {} went away; analysis continues",
                        self.session.id()
                    );
                    self.consumer = None;
                }
            }
        }

        self.source.close();
        self.consumer.take();
        self.session.mark_closed();
        self.pipeline.finish();
        self.evict_self();
    }

    fn deliver(&self, mut chunk: Vec<u8>) -> Delivery {
        let Some(sender) = self.consumer.as_ref() else {
            return Delivery::Disconnected;
        };
        loop {
            match sender.send_timeout(chunk, STOP_POLL) {
                Ok(()) => return Delivery::Sent,
                Err(SendTimeoutError::Timeout(pending)) => {
                    if self.session.stop_requested() {
                        return Delivery::Stopped;
                    }
                    chunk = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Delivery::Disconnected,
            }
        }
    }

    /// Removes this session's entry unless it has been replaced.
    fn evict_self(&self) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let ours = sessions
            .get(self.session.id())
            .is_some_and(|current| Arc::ptr_eq(current, &self.session));
        if ours {
            sessions.remove(self.session.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame_pipeline::tests::test_context;
    use crate::session::monitor_session::SessionState;
    use crate::shared::frame::Frame;
    use crate::shared::video_metadata::VideoMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Handles {
        opened: AtomicUsize,
        open_now: AtomicUsize,
        max_open: AtomicUsize,
        closed: AtomicUsize,
    }

    /// Device index whose reads block for [`STALL`].
    const STALLED_DEVICE: u32 = 9;
    const STALL: Duration = Duration::from_millis(1500);

    /// Endless grey feed that tracks how many instances are open.
    struct TrackedSource {
        metadata: VideoMetadata,
        handles: Arc<Handles>,
        open: bool,
        next: usize,
        delay: Duration,
    }

    impl FrameSource for TrackedSource {
        fn metadata(&self) -> &VideoMetadata {
            &self.metadata
        }

        fn read(&mut self) -> Option<Frame> {
            if !self.open {
                return None;
            }
            std::thread::sleep(self.delay);
            self.next += 1;
            Some(Frame::filled(16, 16, [50, 50, 50], self.next - 1))
        }

        fn close(&mut self) {
            if self.open {
                self.open = false;
                self.handles.open_now.fetch_sub(1, Ordering::SeqCst);
                self.handles.closed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct TrackedOpener {
        handles: Arc<Handles>,
        finite: Option<usize>,
    }

    impl SourceOpener for TrackedOpener {
        fn open(&self, spec: &SourceSpec) -> Result<Box<dyn FrameSource>, SourceError> {
            if let SourceSpec::File(path) = spec {
                if path.ends_with("broken.mp4") {
                    return Err(SourceError::unavailable(spec, "cannot open"));
                }
                if let Some(n) = self.finite {
                    let frames = (0..n).map(|i| Frame::filled(16, 16, [50, 50, 50], i)).collect();
                    return Ok(Box::new(
                        crate::video::infrastructure::memory_source::MemoryFrameSource::new(frames, 10.0),
                    ));
                }
            }
            self.handles.opened.fetch_add(1, Ordering::SeqCst);
            let now = self.handles.open_now.fetch_add(1, Ordering::SeqCst) + 1;
            self.handles.max_open.fetch_max(now, Ordering::SeqCst);
            let delay = match spec {
                SourceSpec::Device(STALLED_DEVICE) => STALL,
                _ => Duration::from_millis(2),
            };
            Ok(Box::new(TrackedSource {
                metadata: VideoMetadata {
                    width: 16,
                    height: 16,
                    fps: 30.0,
                    total_frames: 0,
                    codec: "test".to_string(),
                },
                handles: Arc::clone(&self.handles),
                open: true,
                next: 0,
                delay,
            }))
        }
    }

    fn registry(dir: &std::path::Path, finite: Option<usize>) -> (SessionRegistry, Arc<Handles>) {
        let handles = Arc::new(Handles::default());
        let opener = TrackedOpener {
            handles: Arc::clone(&handles),
            finite,
        };
        (
            SessionRegistry::new(Arc::new(opener), test_context(dir), 80),
            handles,
        )
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_unopenable_source_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry(dir.path(), None);

        let result = registry.start("cam", "broken.mp4".parse().unwrap(), None);
        assert!(matches!(result, Err(SessionError::SourceUnavailable(_))));
        assert!(registry.is_empty());
        assert!(matches!(registry.get("cam"), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_replacing_closes_previous_source_first() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, handles) = registry(dir.path(), None);

        let first = registry.start("cam", SourceSpec::Device(0), None).unwrap();
        wait_until(|| first.frames_read() > 0);
        let second = registry.start("cam", SourceSpec::Device(1), None).unwrap();

        assert_eq!(handles.opened.load(Ordering::SeqCst), 2);
        assert_eq!(handles.closed.load(Ordering::SeqCst), 1);
        assert_eq!(handles.open_now.load(Ordering::SeqCst), 1);
        assert_eq!(handles.max_open.load(Ordering::SeqCst), 1);
        assert_eq!(first.state(), SessionState::Closed);
        assert!(Arc::ptr_eq(&registry.get("cam").unwrap(), &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stop_closes_source_and_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, handles) = registry(dir.path(), None);

        let session = registry.start("cam", SourceSpec::Device(0), None).unwrap();
        registry.stop("cam").unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(handles.open_now.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
        assert!(matches!(registry.stop("cam"), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_stop_unblocks_worker_waiting_on_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, handles) = registry(dir.path(), None);

        let session = registry.start("cam", SourceSpec::Device(0), None).unwrap();
        let mut stream = session.take_stream().unwrap();
        assert!(stream.next().is_some());
        // nobody reads further, so the worker parks on the full channel
        registry.stop("cam").unwrap();

        assert_eq!(handles.open_now.load(Ordering::SeqCst), 0);
        assert!(stream.by_ref().count() <= 1);
    }

    #[test]
    fn test_stream_yields_multipart_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry(dir.path(), None);

        let session = registry.start("cam", SourceSpec::Device(0), None).unwrap();
        let chunks: Vec<_> = session.take_stream().unwrap().take(3).collect();
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
            assert!(chunk.ends_with(b"\r\n"));
        }
        registry.stop("cam").unwrap();
    }

    #[test]
    fn test_dropped_stream_keeps_session_running() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry(dir.path(), None);

        let session = registry.start("cam", SourceSpec::Device(0), None).unwrap();
        let first: Vec<_> = session.take_stream().unwrap().take(1).collect();
        assert_eq!(first.len(), 1);

        let seen = session.frames_read();
        wait_until(|| session.frames_read() > seen + 5);
        assert_eq!(session.state(), SessionState::Active);
        assert!(matches!(session.take_stream(), Err(SessionError::StreamClaimed(_))));
    }

    #[test]
    fn test_finished_source_removes_its_own_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry(dir.path(), Some(3));

        let session = registry.start("clip", "clip.mp4".parse().unwrap(), None).unwrap();
        let chunks: Vec<_> = session.take_stream().unwrap().collect();

        assert!(chunks.len() <= 3);
        wait_until(|| registry.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.frames_read(), 3);
        assert_eq!(session.last_frame().unwrap().index(), 2);
    }

    #[test]
    fn test_sessions_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, handles) = registry(dir.path(), None);

        registry.start("a", SourceSpec::Device(0), None).unwrap();
        let b = registry.start("b", SourceSpec::Device(1), None).unwrap();
        registry.stop("a").unwrap();

        assert_eq!(registry.ids(), vec!["b".to_string()]);
        let seen = b.frames_read();
        wait_until(|| b.frames_read() > seen);
        assert_eq!(handles.open_now.load(Ordering::SeqCst), 1);

        registry.stop_all();
        assert!(registry.is_empty());
        assert_eq!(handles.open_now.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_slow_shutdown_does_not_hold_up_other_ids() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, handles) = registry(dir.path(), None);

        let stalled = registry
            .start("stalled", SourceSpec::Device(STALLED_DEVICE), None)
            .unwrap();
        std::thread::scope(|scope| {
            let stopper = scope.spawn(|| registry.stop("stalled"));
            // the entry goes first; the join on the blocked read follows
            wait_until(|| registry.get("stalled").is_err());
            assert_ne!(stalled.state(), SessionState::Closed);

            let t = Instant::now();
            let other = registry.start("other", SourceSpec::Device(0), None).unwrap();
            wait_until(|| other.frames_read() > 0);
            assert_eq!(registry.ids(), vec!["other".to_string()]);
            assert!(
                t.elapsed() < STALL / 2,
                "start waited {:?} on another session's shutdown",
                t.elapsed()
            );

            stopper.join().unwrap().unwrap();
        });

        assert_eq!(stalled.state(), SessionState::Closed);
        assert_eq!(handles.open_now.load(Ordering::SeqCst), 1);
        registry.stop_all();
        assert_eq!(handles.open_now.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_starts_on_one_id_never_overlap_sources() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, handles) = registry(dir.path(), None);

        std::thread::scope(|scope| {
            for device in 0..4 {
                let registry = &registry;
                scope.spawn(move || registry.start("cam", SourceSpec::Device(device), None).unwrap());
            }
        });

        assert_eq!(registry.len(), 1);
        assert_eq!(handles.opened.load(Ordering::SeqCst), 4);
        assert_eq!(handles.max_open.load(Ordering::SeqCst), 1);
        registry.stop_all();
        assert!(registry.lanes.lock().unwrap().is_empty());
    }
}
