//! Progress events emitted by the download engine, and the sinks that consume them.
//!
//! The engine calls a [`ProgressSink`] from its worker threads. For any one task
//! the calls arrive in order (queued, started, advanced…, finished or failed);
//! calls for different tasks interleave freely.

use std::sync::{Arc, Mutex};

use crate::task::{DownloadTask, TaskId};

/// Receiver of per-task progress. Every method defaults to a no-op.
pub trait ProgressSink: Send + Sync {
    fn on_queued(&self, _task: &DownloadTask) {}
    fn on_started(&self, _task: &DownloadTask, _total_bytes: Option<u64>) {}
    fn on_advanced(&self, _task: &DownloadTask, _delta: u64) {}
    fn on_finished(&self, _task: &DownloadTask, _total_bytes: u64) {}
    fn on_failed(&self, _task: &DownloadTask, _reason: &str) {}
}

/// Typed form of the sink calls, for channels and recordings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Queued,
    Started { total_bytes: Option<u64> },
    Advanced { delta: u64 },
    Finished { total_bytes: u64 },
    Failed { reason: String },
}

impl ProgressEvent {
    /// Call the matching sink method.
    pub fn deliver(&self, sink: &dyn ProgressSink, task: &DownloadTask) {
        match self {
            ProgressEvent::Queued => sink.on_queued(task),
            ProgressEvent::Started { total_bytes } => sink.on_started(task, *total_bytes),
            ProgressEvent::Advanced { delta } => sink.on_advanced(task, *delta),
            ProgressEvent::Finished { total_bytes } => sink.on_finished(task, *total_bytes),
            ProgressEvent::Failed { reason } => sink.on_failed(task, reason),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Finished { .. } | ProgressEvent::Failed { .. })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {}

/// Structured log lines via `tracing`. The engine already logs every outcome at
/// info or error, so this sink stays at `debug`, with per-chunk events at `trace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_queued(&self, task: &DownloadTask) {
        tracing::debug!(task = task.id, file = %task.file_name, url = %task.source_url, "queued");
    }

    fn on_started(&self, task: &DownloadTask, total_bytes: Option<u64>) {
        tracing::debug!(task = task.id, file = %task.file_name, ?total_bytes, "downloading");
    }

    fn on_advanced(&self, task: &DownloadTask, delta: u64) {
        tracing::trace!(task = task.id, delta, done = task.bytes_transferred(), "chunk");
    }

    fn on_finished(&self, task: &DownloadTask, total_bytes: u64) {
        tracing::debug!(task = task.id, file = %task.file_name, total_bytes, "finished");
    }

    fn on_failed(&self, task: &DownloadTask, reason: &str) {
        tracing::debug!(task = task.id, file = %task.file_name, reason, "unable to download");
    }
}

/// Forwards every event to an async consumer. Unbounded so no event is dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<(TaskId, ProgressEvent)>,
}

impl ChannelSink {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<(TaskId, ProgressEvent)>) -> Self {
        Self { tx }
    }

    fn send(&self, task: &DownloadTask, event: ProgressEvent) {
        // Receiver gone means nobody is listening any more; the batch carries on.
        let _ = self.tx.send((task.id, event));
    }
}

impl ProgressSink for ChannelSink {
    fn on_queued(&self, task: &DownloadTask) {
        self.send(task, ProgressEvent::Queued);
    }

    fn on_started(&self, task: &DownloadTask, total_bytes: Option<u64>) {
        self.send(task, ProgressEvent::Started { total_bytes });
    }

    fn on_advanced(&self, task: &DownloadTask, delta: u64) {
        self.send(task, ProgressEvent::Advanced { delta });
    }

    fn on_finished(&self, task: &DownloadTask, total_bytes: u64) {
        self.send(task, ProgressEvent::Finished { total_bytes });
    }

    fn on_failed(&self, task: &DownloadTask, reason: &str) {
        self.send(
            task,
            ProgressEvent::Failed {
                reason: reason.to_string(),
            },
        );
    }
}

/// Keeps every event in arrival order. Meant for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(TaskId, ProgressEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, task: &DownloadTask, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((task.id, event));
    }

    /// All events so far.
    pub fn events(&self) -> Vec<(TaskId, ProgressEvent)> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Events of one task, in the order the engine produced them.
    pub fn events_for(&self, id: TaskId) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|(t, _)| *t == id)
            .map(|(_, e)| e)
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn on_queued(&self, task: &DownloadTask) {
        self.push(task, ProgressEvent::Queued);
    }

    fn on_started(&self, task: &DownloadTask, total_bytes: Option<u64>) {
        self.push(task, ProgressEvent::Started { total_bytes });
    }

    fn on_advanced(&self, task: &DownloadTask, delta: u64) {
        self.push(task, ProgressEvent::Advanced { delta });
    }

    fn on_finished(&self, task: &DownloadTask, total_bytes: u64) {
        self.push(task, ProgressEvent::Finished { total_bytes });
    }

    fn on_failed(&self, task: &DownloadTask, reason: &str) {
        self.push(
            task,
            ProgressEvent::Failed {
                reason: reason.to_string(),
            },
        );
    }
}

/// Broadcasts to several independent sinks.
#[derive(Default, Clone)]
pub struct Fanout {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    fn each(&self, event: ProgressEvent, task: &DownloadTask) {
        for sink in &self.sinks {
            event.deliver(sink.as_ref(), task);
        }
    }
}

impl ProgressSink for Fanout {
    fn on_queued(&self, task: &DownloadTask) {
        self.each(ProgressEvent::Queued, task);
    }

    fn on_started(&self, task: &DownloadTask, total_bytes: Option<u64>) {
        self.each(ProgressEvent::Started { total_bytes }, task);
    }

    fn on_advanced(&self, task: &DownloadTask, delta: u64) {
        self.each(ProgressEvent::Advanced { delta }, task);
    }

    fn on_finished(&self, task: &DownloadTask, total_bytes: u64) {
        self.each(ProgressEvent::Finished { total_bytes }, task);
    }

    fn on_failed(&self, task: &DownloadTask, reason: &str) {
        self.each(
            ProgressEvent::Failed {
                reason: reason.to_string(),
            },
            task,
        );
    }
}
