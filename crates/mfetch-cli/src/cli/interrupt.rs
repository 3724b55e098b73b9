//! Ctrl-C handling shared by the download and verify commands.
//!
//! The first Ctrl-C sets the abort flag that the engine and the verifier
//! check between chunks. A second one exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Exit status for a run ended by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

pub struct Interrupt {
    flag: Arc<AtomicBool>,
    watcher: JoinHandle<()>,
}

impl Interrupt {
    /// Start listening. The listener lives until this value is dropped.
    pub fn watch() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let set = Arc::clone(&flag);
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("interrupted, cancelling");
            eprintln!("Interrupted, finishing up. Press Ctrl-C again to quit now.");
            set.store(true, Ordering::Relaxed);

            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted twice, exiting");
                std::process::exit(EXIT_INTERRUPTED);
            }
        });
        Self { flag, watcher }
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
