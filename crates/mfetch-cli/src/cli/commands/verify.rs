//! `mfetch verify` – check files on disk against their `.chk` manifests.

use anyhow::{bail, Context, Result};
use mfetch_core::checksum::{self, Verifier, VerifierOptions};
use mfetch_core::config::MfetchConfig;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cli::interrupt::Interrupt;
use crate::cli::progress::VerifyReporter;

/// Verify `manifests` on a blocking thread, stopping early once `abort` is
/// set. Returns the number of files that did not match.
pub async fn verify_manifests(
    options: VerifierOptions,
    manifests: Vec<PathBuf>,
    abort: Arc<AtomicBool>,
) -> Result<usize> {
    if manifests.is_empty() {
        println!("No checksum manifests to verify.");
        return Ok(0);
    }
    let verifier = Verifier::new(Arc::new(VerifyReporter::new()))
        .with_options(options)
        .with_abort(Arc::clone(&abort));
    let results = tokio::task::spawn_blocking(move || verifier.verify(&manifests)).await?;
    if abort.load(Ordering::Relaxed) {
        bail!("interrupted during verification");
    }

    let mismatched = results.iter().filter(|r| !r.matched).count();
    println!(
        "Verified {} file(s): {} OK, {} failed.",
        results.len(),
        results.len() - mismatched,
        mismatched
    );
    Ok(mismatched)
}

pub async fn run_verify(
    cfg: &MfetchConfig,
    dir: &Path,
    manifests: Vec<PathBuf>,
    jobs: Option<usize>,
) -> Result<()> {
    let manifests = if manifests.is_empty() {
        checksum::discover_manifests(dir)
            .with_context(|| format!("cannot search {} for manifests", dir.display()))?
    } else {
        manifests
    };

    let mut options = cfg.verifier_options();
    if let Some(jobs) = jobs {
        options.jobs = jobs.max(1);
    }

    let interrupt = Interrupt::watch();
    let mismatched = verify_manifests(options, manifests, interrupt.flag()).await?;
    if mismatched > 0 {
        bail!("{} file(s) failed verification", mismatched);
    }
    Ok(())
}
