use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(String),
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("job pool is shut down")]
    PoolClosed,
}

/// Totals for one finished job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobReport {
    pub frames: usize,
    pub alerts: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed(JobReport),
    Failed(JobError),
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed(_) | JobStatus::Failed(_))
    }
}

type Shared = Arc<(Mutex<JobStatus>, Condvar)>;

/// Observer for a submitted job. Cheap to clone.
#[derive(Clone)]
pub struct JobHandle {
    id: Uuid,
    name: String,
    state: Shared,
}

impl JobHandle {
    fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            state: Arc::new((Mutex::new(JobStatus::Queued), Condvar::new())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> JobStatus {
        let (lock, _) = &*self.state;
        lock.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Blocks until the job completes or fails.
    pub fn wait(&self) -> JobStatus {
        let (lock, cvar) = &*self.state;
        let mut status = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !status.is_finished() {
            status = cvar.wait(status).unwrap_or_else(|e| e.into_inner());
        }
        status.clone()
    }

    fn set(&self, next: JobStatus) {
        let (lock, cvar) = &*self.state;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = next;
        cvar.notify_all();
    }
}

pub type JobTask = Box<dyn FnOnce() -> Result<JobReport, String> + Send>;

struct Job {
    task: JobTask,
    handle: JobHandle,
}

/// Fixed set of worker threads draining a job channel.
///
/// Jobs run in submission order as workers free up. A panicking job is
/// reported as [`JobStatus::Failed`] and the worker keeps going. Dropping
/// the pool lets queued jobs finish, then joins the workers.
pub struct JobPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl JobPool {
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers: Vec<_> = (0..workers.max(1))
            .filter_map(|i| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("job-worker-{i}"))
                    .spawn(move || run_worker(receiver))
                    .map_err(|e| log::error!("Failed to start job worker {i}: {e}"))
                    .ok()
            })
            .collect();

        Self {
            sender: (!workers.is_empty()).then_some(sender),
            workers,
        }
    }

    pub fn submit<F>(&self, name: &str, task: F) -> JobHandle
    where
        F: FnOnce() -> Result<JobReport, String> + Send + 'static,
    {
        let handle = JobHandle::new(name);
        let job = Job {
            task: Box::new(task),
            handle: handle.clone(),
        };
        let sent = match self.sender.as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if !sent {
            log::error!("Job {name} rejected: pool is shut down");
            handle.set(JobStatus::Failed(JobError::PoolClosed));
        }
        handle
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Job worker panicked");
            }
        }
    }
}

fn run_worker(receiver: Receiver<Job>) {
    for Job { task, handle } in receiver.iter() {
        handle.set(JobStatus::Running);
        log::info!("Job {} ({}) started", handle.name, handle.id);

        let status = match catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(report)) => JobStatus::Completed(report),
            Ok(Err(reason)) => JobStatus::Failed(JobError::Failed(reason)),
            Err(payload) => JobStatus::Failed(JobError::Panicked(panic_message(payload.as_ref()))),
        };
        match &status {
            JobStatus::Completed(report) => log::info!(
                "Job {} finished: {} frames, {} alerts",
                handle.name,
                report.frames,
                report.alerts
            ),
            JobStatus::Failed(e) => log::error!("Job {}: {e}", handle.name),
            _ => {}
        }
        handle.set(status);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
