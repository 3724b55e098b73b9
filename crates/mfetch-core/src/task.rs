//! Download task: one file transfer and its state transitions.
//!
//! A task is plain data. The engine drives it through
//! `Queued → InProgress → {Finished | Failed}` (or `Queued → Failed` when the
//! transfer never got a usable response). Terminal tasks reject every further
//! transition.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::catalog::CatalogEntry;
use crate::template::UrlTemplate;

/// Position of a task within its batch.
pub type TaskId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    InProgress,
    Finished,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::InProgress => "in progress",
            TaskStatus::Finished => "finished",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Coarse failure class, kept on the task for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connection,
    HttpStatus(u32),
    DiskWrite,
    Cancelled,
    WorkerPanicked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("task {id} cannot {action} while {status}")]
pub struct TaskStateError {
    pub id: TaskId,
    pub action: &'static str,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub id: TaskId,
    pub source_url: String,
    pub file_name: String,
    pub destination: PathBuf,
    total_bytes: Option<u64>,
    bytes_transferred: u64,
    status: TaskStatus,
    failure: Option<TaskFailure>,
}

impl DownloadTask {
    pub fn new(
        id: TaskId,
        source_url: impl Into<String>,
        file_name: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id,
            source_url: source_url.into(),
            file_name: file_name.into(),
            destination: destination.into(),
            total_bytes: None,
            bytes_transferred: 0,
            status: TaskStatus::Queued,
            failure: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Expected size from `Content-Length`; `None` until headers arrive or if absent.
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.failure.as_ref()
    }

    /// Queued → InProgress once a 2xx response is in hand.
    pub fn start(&mut self, total_bytes: Option<u64>) -> Result<(), TaskStateError> {
        self.expect(TaskStatus::Queued, "start")?;
        self.total_bytes = total_bytes;
        self.status = TaskStatus::InProgress;
        Ok(())
    }

    /// InProgress → InProgress, adding one written chunk.
    pub fn advance(&mut self, delta: u64) -> Result<(), TaskStateError> {
        self.expect(TaskStatus::InProgress, "advance")?;
        self.bytes_transferred += delta;
        Ok(())
    }

    /// InProgress → Finished. Returns the final byte count.
    pub fn finish(&mut self) -> Result<u64, TaskStateError> {
        self.expect(TaskStatus::InProgress, "finish")?;
        self.status = TaskStatus::Finished;
        Ok(self.bytes_transferred)
    }

    /// Queued | InProgress → Failed.
    pub fn fail(&mut self, failure: TaskFailure) -> Result<(), TaskStateError> {
        if self.status.is_terminal() {
            return Err(self.state_error("fail"));
        }
        self.status = TaskStatus::Failed;
        self.failure = Some(failure);
        Ok(())
    }

    fn expect(&self, wanted: TaskStatus, action: &'static str) -> Result<(), TaskStateError> {
        if self.status != wanted {
            return Err(self.state_error(action));
        }
        Ok(())
    }

    fn state_error(&self, action: &'static str) -> TaskStateError {
        TaskStateError {
            id: self.id,
            action,
            status: self.status,
        }
    }
}

impl fmt::Display for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.destination.display())
    }
}

/// Turn catalog entries into queued tasks. Root-group files go to `<root>/<file>`,
/// others to `<root>/<group>/<file>`.
pub fn plan_tasks(entries: &[CatalogEntry], template: &UrlTemplate, root: &Path) -> Vec<DownloadTask> {
    entries
        .iter()
        .enumerate()
        .map(|(id, entry)| {
            let destination = if entry.is_root() {
                root.join(&entry.file_name)
            } else {
                root.join(&entry.group).join(&entry.file_name)
            };
            DownloadTask::new(
                id,
                template.render(&entry.relative_path()),
                entry.file_name.clone(),
                destination,
            )
        })
        .collect()
}

/// Create every destination's parent directory before the batch starts.
pub fn create_parent_dirs(tasks: &[DownloadTask]) -> io::Result<()> {
    for task in tasks {
        if let Some(parent) = task.destination.parent() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
