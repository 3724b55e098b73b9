//! Concurrent download engine.
//!
//! Takes a batch of queued tasks and runs one HTTP GET per task. By default
//! every task gets its own thread (no limit). When `max_concurrent` is set, a
//! fixed pool of workers pulls tasks from a shared queue instead. Every
//! failure stays inside its task: the task ends Failed, the error is logged,
//! a Failed event goes to the sink, and the rest of the batch carries on.
//! `download_all` returns once every task is Finished or Failed.
//!
//! A disk write error mid-stream leaves the partial file on disk. Nothing is
//! cleaned up, so the file can be inspected or resumed by hand.

mod error;
mod response;
mod transfer;

pub use error::DownloadError;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::progress::{NoopSink, ProgressSink};
use crate::task::DownloadTask;

/// Bytes handed to the write callback at a time.
pub const CHUNK_SIZE: usize = 1024;

/// Static request headers sent with every GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeaders {
    pub user_agent: String,
    pub accept: String,
    pub accept_encoding: String,
    pub connection: String,
    pub referer: String,
}

impl Default for RequestHeaders {
    fn default() -> Self {
        Self {
            user_agent: "Wget/1.21.4".to_string(),
            accept: "*/*".to_string(),
            accept_encoding: "identity".to_string(),
            connection: "Keep-Alive".to_string(),
            referer: "https://download.llamameta.net/".to_string(),
        }
    }
}

impl RequestHeaders {
    /// `Name: value` lines, in a fixed order.
    pub fn lines(&self) -> Vec<String> {
        [
            ("User-Agent", &self.user_agent),
            ("Accept", &self.accept),
            ("Accept-Encoding", &self.accept_encoding),
            ("Connection", &self.connection),
            ("Referer", &self.referer),
        ]
        .into_iter()
        .map(|(k, v)| format!("{}: {}", k, v.trim()))
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum transfers in flight; `None` runs every task at once.
    pub max_concurrent: Option<usize>,
    pub connect_timeout: Duration,
    /// Whole-request timeout; `None` lets large files take as long as they need.
    pub request_timeout: Option<Duration>,
    pub chunk_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
            chunk_size: CHUNK_SIZE,
        }
    }
}

pub struct DownloadEngine {
    sink: Arc<dyn ProgressSink>,
    headers: RequestHeaders,
    options: EngineOptions,
    abort: Option<Arc<AtomicBool>>,
}

impl Default for DownloadEngine {
    fn default() -> Self {
        Self::new(Arc::new(NoopSink))
    }
}

impl DownloadEngine {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            headers: RequestHeaders::default(),
            options: EngineOptions::default(),
            abort: None,
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Token checked between chunks; once set, running and pending tasks end
    /// as Failed with [`DownloadError::Cancelled`].
    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = Some(abort);
        self
    }

    fn is_aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|a| a.load(Ordering::Relaxed))
    }

    /// Download every task concurrently and return them, in input order, each
    /// Finished or Failed. Blocks until the whole batch is done.
    pub fn download_all(&self, tasks: Vec<DownloadTask>) -> Vec<DownloadTask> {
        if tasks.is_empty() {
            return tasks;
        }
        for task in &tasks {
            self.sink.on_queued(task);
        }

        let originals = tasks.clone();
        let outcomes = match self.options.max_concurrent {
            Some(max) if max < tasks.len() => self.run_pool(tasks, max.max(1)),
            _ => self.run_unbounded(tasks),
        };

        outcomes
            .into_iter()
            .zip(originals)
            .map(|(outcome, original)| match outcome {
                Ok(task) => task,
                Err(reason) => {
                    let mut task = original;
                    self.record_failure(&mut task, DownloadError::WorkerPanicked(reason));
                    task
                }
            })
            .collect()
    }

    /// One thread per task.
    fn run_unbounded(&self, tasks: Vec<DownloadTask>) -> Vec<Result<DownloadTask, String>> {
        thread::scope(|scope| {
            let handles: Vec<_> = tasks
                .into_iter()
                .map(|task| {
                    thread::Builder::new()
                        .name(format!("mfetch-task-{}", task.id))
                        .spawn_scoped(scope, move || self.run_task(task))
                })
                .collect();

            handles
                .into_iter()
                .map(|spawned| match spawned {
                    Ok(handle) => handle
                        .join()
                        .map_err(|_| "worker thread panicked".to_string()),
                    Err(e) => Err(format!("could not spawn worker thread: {e}")),
                })
                .collect()
        })
    }

    /// `workers` threads draining a shared queue.
    fn run_pool(&self, tasks: Vec<DownloadTask>, workers: usize) -> Vec<Result<DownloadTask, String>> {
        let count = tasks.len();
        let work: Mutex<VecDeque<(usize, DownloadTask)>> =
            Mutex::new(tasks.into_iter().enumerate().collect());
        let mut slots: Vec<Option<DownloadTask>> = vec![None; count];

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            let mut handles = Vec::with_capacity(workers);
            for n in 0..workers {
                let tx = tx.clone();
                let work = &work;
                let spawned = thread::Builder::new()
                    .name(format!("mfetch-worker-{n}"))
                    .spawn_scoped(scope, move || loop {
                        let next = work.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                        let Some((slot, task)) = next else {
                            break;
                        };
                        let _ = tx.send((slot, self.run_task(task)));
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => tracing::error!("could not spawn worker thread: {e}"),
                }
            }
            drop(tx);

            for (slot, task) in rx {
                slots[slot] = Some(task);
            }
            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("download worker panicked");
                }
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| "no worker returned the task".to_string()))
            .collect()
    }

    /// Transfer one task and settle it as Finished or Failed.
    fn run_task(&self, mut task: DownloadTask) -> DownloadTask {
        match transfer::fetch(self, &mut task) {
            Ok(code) => match task.finish() {
                Ok(total) => {
                    tracing::info!("{} | {} | {} bytes completed.", code, task.file_name, total);
                    self.sink.on_finished(&task, total);
                }
                Err(e) => tracing::error!("{e}"),
            },
            Err(err) => self.record_failure(&mut task, err),
        }
        task
    }

    fn record_failure(&self, task: &mut DownloadTask, err: DownloadError) {
        tracing::error!(
            file = %task.file_name,
            url = %task.source_url,
            path = %task.destination.display(),
            "unable to download: {err}"
        );
        let failure = err.to_failure();
        let reason = failure.message.clone();
        match task.fail(failure) {
            Ok(()) => self.sink.on_failed(task, &reason),
            Err(e) => tracing::error!("{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProgressEvent, RecordingSink};
    use crate::task::{FailureKind, TaskStatus};

    #[test]
    fn default_headers_are_fixed() {
        assert_eq!(
            RequestHeaders::default().lines(),
            [
                "User-Agent: Wget/1.21.4",
                "Accept: */*",
                "Accept-Encoding: identity",
                "Connection: Keep-Alive",
                "Referer: https://download.llamameta.net/",
            ]
        );
    }

    #[test]
    fn default_options_are_unbounded_1k_chunks() {
        let o = EngineOptions::default();
        assert!(o.max_concurrent.is_none());
        assert!(o.request_timeout.is_none());
        assert_eq!(o.chunk_size, 1024);
    }

    #[test]
    fn empty_batch_returns_immediately() {
        let sink = Arc::new(RecordingSink::new());
        let engine = DownloadEngine::new(sink.clone());
        assert!(engine.download_all(Vec::new()).is_empty());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn aborted_batch_fails_every_task_without_network() {
        let sink = Arc::new(RecordingSink::new());
        let abort = Arc::new(AtomicBool::new(true));
        let engine = DownloadEngine::new(sink.clone()).with_abort(abort);
        let dir = tempfile::tempdir().unwrap();
        let tasks = (0..3)
            .map(|i| {
                DownloadTask::new(
                    i,
                    format!("http://127.0.0.1:9/{i}"),
                    format!("f{i}"),
                    dir.path().join(format!("f{i}")),
                )
            })
            .collect();

        let done = engine.download_all(tasks);
        assert_eq!(done.len(), 3);
        for (i, task) in done.iter().enumerate() {
            assert_eq!(task.id, i);
            assert_eq!(task.status(), TaskStatus::Failed);
            assert_eq!(task.failure().unwrap().kind, FailureKind::Cancelled);
            assert!(!task.destination.exists());
            assert_eq!(
                sink.events_for(i),
                [
                    ProgressEvent::Queued,
                    ProgressEvent::Failed {
                        reason: "cancelled".to_string()
                    }
                ]
            );
        }
    }

    #[test]
    fn pool_with_abort_keeps_input_order() {
        let abort = Arc::new(AtomicBool::new(true));
        let engine = DownloadEngine::default()
            .with_abort(abort)
            .with_options(EngineOptions {
                max_concurrent: Some(2),
                ..EngineOptions::default()
            });
        let tasks = (0..5)
            .map(|i| DownloadTask::new(i, "http://127.0.0.1:9/x", "x", "/nonexistent/x"))
            .collect();
        let done = engine.download_all(tasks);
        let ids: Vec<usize> = done.iter().map(|t| t.id).collect();
        assert_eq!(ids, [0, 1, 2, 3, 4]);
        assert!(done.iter().all(|t| t.status() == TaskStatus::Failed));
    }
}
