/// Concurrent job execution
///
/// Runs backup and restore jobs under a bounded pool of process slots,
/// supervises each job's external process, and reports lifecycle events to
/// a single subscriber over an explicit channel. Submission and
/// cancellation never block on process completion.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::sync::{mpsc, Notify, Semaphore};

use crate::core::error::Result;
use crate::core::invoker::{BackupFormat, ToolInvoker};
use crate::core::servers::ServerDescriptor;

/// Identifier handed back by [`JobRunner::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One unit of work for the runner. Consumed on submission, never mutated.
#[derive(Debug, Clone)]
pub enum JobRequest {
    Backup {
        server: ServerDescriptor,
        database: String,
        output_dir: PathBuf,
        format: BackupFormat,
    },
    Restore {
        server: ServerDescriptor,
        backup_path: PathBuf,
        /// `Some` loads the artifact into the named existing database;
        /// `None` lets pg_restore create the database recorded in the
        /// artifact's own metadata.
        target: Option<String>,
    },
}

impl JobRequest {
    /// Short human label subscribers can use when rendering events.
    pub fn label(&self) -> String {
        match self {
            JobRequest::Backup { database, .. } => database.clone(),
            JobRequest::Restore { backup_path, .. } => backup_path.display().to_string(),
        }
    }
}

/// Lifecycle events delivered to the runner's subscriber.
///
/// Every submitted job produces exactly one terminal event (`Succeeded`,
/// `Failed` or `Cancelled`), preceded by zero or more `Progress` events
/// for the same job. No ordering holds between different jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Progress { id: JobId, percent: u8 },
    Succeeded { id: JobId },
    Failed { id: JobId, message: String },
    Cancelled { id: JobId },
}

impl JobEvent {
    pub fn id(&self) -> JobId {
        match self {
            JobEvent::Progress { id, .. }
            | JobEvent::Succeeded { id }
            | JobEvent::Failed { id, .. }
            | JobEvent::Cancelled { id } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}

/// One backup request per selected database.
pub fn plan_backup(
    server: &ServerDescriptor,
    databases: &[String],
    output_dir: &Path,
    format: BackupFormat,
) -> Vec<JobRequest> {
    databases
        .iter()
        .map(|database| JobRequest::Backup {
            server: server.clone(),
            database: database.clone(),
            output_dir: output_dir.to_path_buf(),
            format,
        })
        .collect()
}

/// Restore requests under the selection-arity rule: exactly one file
/// together with exactly one target database restores into that database;
/// every other combination restores each file in auto-create mode. The
/// decision is made once per batch, here.
pub fn plan_restore(
    server: &ServerDescriptor,
    files: &[PathBuf],
    targets: &[String],
) -> Vec<JobRequest> {
    if files.len() == 1 && targets.len() == 1 {
        return vec![JobRequest::Restore {
            server: server.clone(),
            backup_path: files[0].clone(),
            target: Some(targets[0].clone()),
        }];
    }

    files
        .iter()
        .map(|file| JobRequest::Restore {
            server: server.clone(),
            backup_path: file.clone(),
            target: None,
        })
        .collect()
}

#[derive(Default)]
struct JobHandle {
    cancelled: AtomicBool,
    cancel: Notify,
}

impl JobHandle {
    fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

enum Outcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Bounded-concurrency runner for backup and restore jobs.
pub struct JobRunner {
    invoker: Arc<dyn ToolInvoker>,
    slots: Arc<Semaphore>,
    active: Arc<Mutex<HashMap<JobId, Arc<JobHandle>>>>,
    events: mpsc::UnboundedSender<JobEvent>,
    next_id: AtomicU64,
}

impl JobRunner {
    /// Create a runner with `pool_size` concurrent process slots, returning
    /// the event stream for the single subscriber.
    pub fn new(
        pool_size: usize,
        invoker: Arc<dyn ToolInvoker>,
    ) -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        assert!(pool_size > 0, "pool size must be at least 1");
        let (events, receiver) = mpsc::unbounded_channel();
        let runner = Self {
            invoker,
            slots: Arc::new(Semaphore::new(pool_size)),
            active: Arc::new(Mutex::new(HashMap::new())),
            events,
            next_id: AtomicU64::new(1),
        };
        (runner, receiver)
    }

    /// Enqueue a job and return immediately. Waiting for a free slot is the
    /// runner's business; the caller is never blocked, even with the pool
    /// saturated.
    pub fn submit(&self, request: JobRequest) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(JobHandle::default());
        self.active
            .lock()
            .expect("active job table poisoned")
            .insert(id, handle.clone());

        tracing::debug!(job = %id, label = %request.label(), "job submitted");

        let invoker = self.invoker.clone();
        let slots = self.slots.clone();
        let active = self.active.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = run_job(invoker.as_ref(), &slots, &handle, id, request).await;
            active
                .lock()
                .expect("active job table poisoned")
                .remove(&id);

            // The subscriber may already be gone; nothing left to notify.
            match outcome {
                Outcome::Succeeded => {
                    let _ = events.send(JobEvent::Progress { id, percent: 100 });
                    let _ = events.send(JobEvent::Succeeded { id });
                }
                Outcome::Failed(message) => {
                    let _ = events.send(JobEvent::Failed { id, message });
                }
                Outcome::Cancelled => {
                    let _ = events.send(JobEvent::Cancelled { id });
                }
            }
        });

        id
    }

    /// Submit a whole batch, returning ids in submission order.
    pub fn submit_batch(&self, requests: Vec<JobRequest>) -> Vec<JobId> {
        requests.into_iter().map(|request| self.submit(request)).collect()
    }

    /// Request cancellation of one job. Idempotent; a no-op once the job has
    /// reached a terminal state. A queued job goes straight to `Cancelled`
    /// without ever launching its process; a running job's process is killed
    /// and `Cancelled` is reported once the OS confirms termination.
    pub fn cancel(&self, id: JobId) {
        let handle = self
            .active
            .lock()
            .expect("active job table poisoned")
            .get(&id)
            .cloned();
        if let Some(handle) = handle {
            tracing::debug!(job = %id, "cancellation requested");
            handle.request_cancel();
        }
    }

    /// Cancel every job not yet in a terminal state. Safe to race with
    /// natural completions; each job still reports exactly one terminal
    /// event.
    pub fn cancel_all(&self) {
        let handles: Vec<Arc<JobHandle>> = self
            .active
            .lock()
            .expect("active job table poisoned")
            .values()
            .cloned()
            .collect();
        tracing::debug!(count = handles.len(), "cancelling all active jobs");
        for handle in handles {
            handle.request_cancel();
        }
    }

    /// Jobs not yet in a terminal state.
    pub fn active_jobs(&self) -> usize {
        self.active.lock().expect("active job table poisoned").len()
    }
}

async fn run_job(
    invoker: &dyn ToolInvoker,
    slots: &Arc<Semaphore>,
    handle: &JobHandle,
    id: JobId,
    request: JobRequest,
) -> Outcome {
    if handle.is_cancelled() {
        return Outcome::Cancelled;
    }

    // Queued: wait for a slot, unless cancellation arrives first. A job
    // cancelled here must never launch its process.
    let _permit = tokio::select! {
        biased;
        _ = handle.cancel.notified() => return Outcome::Cancelled,
        permit = slots.clone().acquire_owned() => permit.expect("job slot semaphore closed"),
    };

    if handle.is_cancelled() {
        return Outcome::Cancelled;
    }

    let mut child = match spawn(invoker, &request) {
        Ok(child) => child,
        Err(err) => return Outcome::Failed(err.to_string()),
    };
    tracing::debug!(job = %id, "process launched");

    // Drain stderr on the side so a chatty tool cannot fill the pipe and
    // stall while we wait on it.
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut text = String::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_string(&mut text).await;
        }
        text
    });

    let status = tokio::select! {
        biased;
        _ = handle.cancel.notified() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            tracing::debug!(job = %id, "process killed on cancellation");
            None
        }
        status = child.wait() => Some(status),
    };
    let stderr_text = stderr_task.await.unwrap_or_default();

    // The cancellation flag wins over whatever exit status the kill left.
    if handle.is_cancelled() {
        return Outcome::Cancelled;
    }

    match status {
        Some(Ok(status)) if status.success() => Outcome::Succeeded,
        Some(Ok(status)) => {
            let diagnostic = stderr_text.trim();
            if diagnostic.is_empty() {
                Outcome::Failed(format!("process exited with {}", status))
            } else {
                Outcome::Failed(diagnostic.to_string())
            }
        }
        Some(Err(err)) => Outcome::Failed(err.to_string()),
        None => Outcome::Cancelled,
    }
}

fn spawn(invoker: &dyn ToolInvoker, request: &JobRequest) -> Result<Child> {
    match request {
        JobRequest::Backup {
            server,
            database,
            output_dir,
            format,
        } => invoker.spawn_backup(server, database, output_dir, *format),
        JobRequest::Restore {
            server,
            backup_path,
            target,
        } => invoker.spawn_restore(server, backup_path, target.as_deref()),
    }
}
