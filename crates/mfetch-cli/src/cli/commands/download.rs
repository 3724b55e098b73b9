//! `mfetch download` – fetch the selected models, then verify them.

use anyhow::{bail, Context, Result};
use mfetch_core::catalog::Catalog;
use mfetch_core::checksum;
use mfetch_core::config::MfetchConfig;
use mfetch_core::engine::{DownloadEngine, EngineOptions};
use mfetch_core::progress::{ChannelSink, Fanout, LogSink};
use mfetch_core::task::{self, TaskStatus};
use mfetch_core::template::UrlTemplate;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::verify::verify_manifests;
use crate::cli::interrupt::Interrupt;
use crate::cli::progress::DownloadReporter;

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub models: Vec<String>,
    pub dest: PathBuf,
    pub jobs: Option<usize>,
    pub timeout: Option<u64>,
    pub no_verify: bool,
}

/// Config values with command-line flags layered on top.
fn engine_options(cfg: &MfetchConfig, request: &DownloadRequest) -> EngineOptions {
    let mut options = cfg.engine_options();
    if let Some(jobs) = request.jobs {
        options.max_concurrent = Some(jobs).filter(|&n| n > 0);
    }
    if let Some(secs) = request.timeout {
        options.request_timeout = Some(Duration::from_secs(secs));
    }
    options
}

pub async fn run_download(cfg: &MfetchConfig, request: DownloadRequest) -> Result<()> {
    let template = UrlTemplate::from_presigned(&request.url)?;
    let catalog = Catalog::llama2();
    let groups = catalog.resolve_aliases(&request.models)?;
    let entries = catalog.resolve(&groups)?;
    let tasks = task::plan_tasks(&entries, &template, &request.dest);
    task::create_parent_dirs(&tasks)
        .with_context(|| format!("cannot create directories under {}", request.dest.display()))?;
    tracing::info!(
        groups = ?groups,
        files = tasks.len(),
        dest = %request.dest.display(),
        "starting download batch"
    );

    let interrupt = Interrupt::watch();
    let reporter = Arc::new(DownloadReporter::new(&tasks));
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let render = {
        let reporter = Arc::clone(&reporter);
        tokio::spawn(async move { reporter.run(rx).await })
    };

    let sink = Fanout::new()
        .with(Arc::new(ChannelSink::new(tx)))
        .with(Arc::new(LogSink));
    let engine = DownloadEngine::new(Arc::new(sink))
        .with_options(engine_options(cfg, &request))
        .with_headers(cfg.request_headers())
        .with_abort(interrupt.flag());
    let done = tokio::task::spawn_blocking(move || engine.download_all(tasks)).await?;
    // The engine and its sender are gone, so the render task drains and ends.
    render.await?;

    let failed = done
        .iter()
        .filter(|t| t.status() == TaskStatus::Failed)
        .count();
    println!("Downloaded {} of {} files.", done.len() - failed, done.len());
    if interrupt.flag().load(Ordering::Relaxed) {
        bail!("interrupted, {} download(s) incomplete", failed);
    }

    let mut mismatched = 0;
    if request.no_verify {
        tracing::info!("checksum verification skipped");
    } else {
        let manifests = checksum::manifests_among(&done);
        mismatched = verify_manifests(cfg.verifier_options(), manifests, interrupt.flag()).await?;
    }

    if failed > 0 || mismatched > 0 {
        bail!("{} download(s) failed, {} checksum mismatch(es)", failed, mismatched);
    }
    Ok(())
}
