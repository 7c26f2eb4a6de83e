use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::detection::domain::model_ref::ModelRef;
use crate::session::session_registry::SessionError;
use crate::shared::frame::Frame;
use crate::stream::frame_sequence::FrameSequence;
use crate::video::domain::source_spec::SourceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Opening => "opening",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        })
    }
}

/// One live analysis of one source, owned by the registry.
///
/// The worker thread is the only writer of frame state; everything here is
/// safe to read from other threads while it runs.
pub struct Session {
    id: String,
    spec: SourceSpec,
    model: Option<ModelRef>,
    state: Mutex<SessionState>,
    last_frame: Mutex<Option<Frame>>,
    frames_read: AtomicUsize,
    stop: AtomicBool,
    stream_claimed: AtomicBool,
    stream: Mutex<Option<Receiver<Vec<u8>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub(crate) fn new(
        id: &str,
        spec: SourceSpec,
        model: Option<ModelRef>,
        stream: Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.to_string(),
            spec,
            model,
            state: Mutex::new(SessionState::Opening),
            last_frame: Mutex::new(None),
            frames_read: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            stream_claimed: AtomicBool::new(false),
            stream: Mutex::new(Some(stream)),
            worker: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    pub fn model(&self) -> Option<&ModelRef> {
        self.model.as_ref()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Most recent successfully decoded frame, before annotation.
    pub fn last_frame(&self) -> Option<Frame> {
        self.last_frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read.load(Ordering::SeqCst)
    }

    /// Hands out the session's chunk stream. Only the first caller gets it.
    pub fn take_stream(&self) -> Result<FrameSequence, SessionError> {
        let receiver = self
            .stream
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| SessionError::StreamClaimed(self.id.clone()))?;
        self.stream_claimed.store(true, Ordering::SeqCst);
        Ok(FrameSequence::new(receiver))
    }

    pub(crate) fn stream_claimed(&self) -> bool {
        self.stream_claimed.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn record_frame(&self, frame: &Frame) {
        *self.last_frame.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame.clone());
        if self.frames_read.fetch_add(1, Ordering::SeqCst) == 0 {
            self.set_state(SessionState::Active);
        }
    }

    pub(crate) fn mark_closed(&self) {
        self.set_state(SessionState::Closed);
    }

    pub(crate) fn attach_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Signals the worker and waits until it has closed the source.
    pub(crate) fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("Worker for session {} panicked", self.id);
            }
        }
        self.mark_closed();
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("state", &self.state())
            .field("frames_read", &self.frames_read())
            .finish()
    }
}
