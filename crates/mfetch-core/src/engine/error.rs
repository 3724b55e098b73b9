//! Per-task download errors. None of these escape `download_all`; each one is
//! turned into a Failed task.

use std::io;
use std::path::PathBuf;

use crate::task::{FailureKind, TaskFailure};

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Curl reported an error (connect, resolve, timeout, short body, etc.).
    #[error("connection error: {0}")]
    Connection(#[from] curl::Error),
    /// Final response had a non-2xx status.
    #[error("HTTP {code} {reason} | {url}")]
    HttpStatus { code: u32, reason: String, url: String },
    /// Local write failed mid-stream. The partial file is left in place.
    #[error("write to {} failed: {source}", .path.display())]
    DiskWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The batch abort token was set.
    #[error("cancelled")]
    Cancelled,
    /// The worker thread never returned the task.
    #[error("{0}")]
    WorkerPanicked(String),
}

impl DownloadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::Connection(_) => FailureKind::Connection,
            DownloadError::HttpStatus { code, .. } => FailureKind::HttpStatus(*code),
            DownloadError::DiskWrite { .. } => FailureKind::DiskWrite,
            DownloadError::Cancelled => FailureKind::Cancelled,
            DownloadError::WorkerPanicked(_) => FailureKind::WorkerPanicked,
        }
    }

    pub fn to_failure(&self) -> TaskFailure {
        TaskFailure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
