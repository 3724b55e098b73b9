//! Checksum command: compute MD5 of a file.

use anyhow::{Context, Result};
use mfetch_core::checksum;
use std::path::Path;

/// Compute and print MD5 of the given file, as a manifest line.
pub async fn run_checksum(path: &Path) -> Result<()> {
    let digest = checksum::md5_path(path).with_context(|| format!("cannot read {}", path.display()))?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
