//! Terminal progress view: one indicatif bar per file, for downloads and for
//! checksum verification.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use mfetch_core::checksum::{VerificationResult, VerifyObserver};
use mfetch_core::progress::ProgressEvent;
use mfetch_core::task::{DownloadTask, TaskId};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedReceiver;

const SIZED: &str = "{spinner:.blue} {msg:.cyan} [{elapsed_precise}] {wide_bar:.cyan/blue} {percent:>3}% {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const UNSIZED: &str = "{spinner:.blue} {msg:.cyan} [{elapsed_precise}] {bytes} ({bytes_per_sec})";

const WAITING: &str = "{spinner:.blue} {msg} [{elapsed_precise}]";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

fn style(template: &str) -> ProgressStyle {
    match ProgressStyle::with_template(template) {
        Ok(s) => s.tick_chars(TICK).progress_chars(PB_CHARS),
        Err(_) => ProgressStyle::default_bar(),
    }
}

/// Bars keyed by task id or file path, all drawn by one `MultiProgress`.
struct Bars<K> {
    multi: MultiProgress,
    bars: Mutex<HashMap<K, ProgressBar>>,
}

impl<K: Eq + Hash> Bars<K> {
    fn new(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, key: K, len: Option<u64>, msg: String) -> ProgressBar {
        let pb = match len {
            Some(len) => ProgressBar::new(len).with_style(style(SIZED)),
            None => ProgressBar::no_length().with_style(style(WAITING)),
        };
        let pb = self.multi.add(pb.with_message(msg));
        self.lock().insert(key, pb.clone());
        pb
    }

    fn get<Q>(&self, key: &Q) -> Option<ProgressBar>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, ProgressBar>> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Download progress: `Queued` → `Downloading` → `Finished` / `Unable to download`.
///
/// Fed from a [`ChannelSink`](mfetch_core::progress::ChannelSink) so the engine
/// threads never block on terminal drawing.
pub struct DownloadReporter {
    bars: Bars<TaskId>,
    names: HashMap<TaskId, String>,
}

impl DownloadReporter {
    pub fn new(tasks: &[DownloadTask]) -> Self {
        Self::with_target(tasks, ProgressDrawTarget::stderr())
    }

    pub fn with_target(tasks: &[DownloadTask], target: ProgressDrawTarget) -> Self {
        Self {
            bars: Bars::new(target),
            names: tasks.iter().map(|t| (t.id, t.file_name.clone())).collect(),
        }
    }

    /// Draw events until every sender has been dropped.
    pub async fn run(&self, mut rx: UnboundedReceiver<(TaskId, ProgressEvent)>) {
        while let Some((id, event)) = rx.recv().await {
            self.apply(id, &event);
        }
    }

    fn apply(&self, id: TaskId, event: &ProgressEvent) {
        let Some(name) = self.names.get(&id) else {
            return;
        };
        if let ProgressEvent::Queued = event {
            self.bars.insert(id, None, format!("Queued {name}"));
            return;
        }
        let Some(pb) = self.bars.get(&id) else {
            return;
        };
        match event {
            ProgressEvent::Queued => {}
            ProgressEvent::Started { total_bytes } => {
                match total_bytes {
                    Some(len) => {
                        pb.set_length(*len);
                        pb.set_style(style(SIZED));
                    }
                    None => pb.set_style(style(UNSIZED)),
                }
                pb.set_message(format!("Downloading {name}"));
            }
            ProgressEvent::Advanced { delta } => pb.inc(*delta),
            ProgressEvent::Finished { total_bytes } => {
                pb.finish_with_message(format!("Finished {name} | {total_bytes} bytes"));
            }
            ProgressEvent::Failed { reason } => {
                pb.abandon_with_message(format!("Unable to download {name} - {reason}"));
            }
        }
    }

    #[cfg(test)]
    fn bar(&self, id: TaskId) -> Option<ProgressBar> {
        self.bars.get(&id)
    }
}

/// Checksum progress: one bar per file while hashing, then the result line.
pub struct VerifyReporter {
    bars: Bars<PathBuf>,
}

impl VerifyReporter {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            bars: Bars::new(target),
        }
    }
}

impl VerifyObserver for VerifyReporter {
    fn on_checking(&self, path: &Path, size: Option<u64>) {
        self.bars
            .insert(path.to_path_buf(), size, format!("Checking {}", path.display()));
    }

    fn on_progress(&self, path: &Path, delta: u64) {
        if let Some(pb) = self.bars.get(path) {
            pb.inc(delta);
        }
    }

    fn on_result(&self, result: &VerificationResult) {
        let Some(pb) = self.bars.get(result.path.as_path()) else {
            return;
        };
        if result.matched {
            pb.finish_with_message(result.to_string());
        } else {
            pb.abandon_with_message(result.to_string());
        }
    }
}
