//! CLI for the mfetch model-weight fetcher.

mod commands;
mod interrupt;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use mfetch_core::config;
use std::path::PathBuf;

use commands::{run_checksum, run_completions, run_download, run_list, run_verify, DownloadRequest};

/// Top-level CLI for mfetch.
#[derive(Debug, Parser)]
#[command(name = "mfetch")]
#[command(about = "mfetch: fetch and verify model weight files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download the selected models, then verify their checksums.
    Download {
        /// URL template with `{0}`, or the presigned URL from the download email (`*` marks the file path).
        #[arg(long)]
        url: String,
        /// Comma-separated model aliases (e.g. 7B,13B-chat). Empty selects every model.
        #[arg(long, value_delimiter = ',', value_name = "MODELS")]
        models: Vec<String>,
        /// Destination root directory.
        #[arg(long, default_value = ".", value_name = "DIR")]
        dest: PathBuf,
        /// Download at most N files at once (default: all at once, or the config value).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Whole-request timeout per file, in seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Skip checksum verification after the batch.
        #[arg(long)]
        no_verify: bool,
    },

    /// Verify downloaded files against checksum manifests.
    Verify {
        /// Directory searched recursively for `.chk` manifests.
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Verify these manifests instead of searching DIR (repeatable).
        #[arg(long = "manifest", value_name = "FILE")]
        manifests: Vec<PathBuf>,
        /// Hash up to N files in parallel.
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Show model aliases, groups and their files.
    List,

    /// Compute MD5 of a file, printed in manifest format.
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Download {
                url,
                models,
                dest,
                jobs,
                timeout,
                no_verify,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                let request = DownloadRequest {
                    url,
                    models,
                    dest,
                    jobs,
                    timeout,
                    no_verify,
                };
                run_download(&cfg, request).await?;
            }
            CliCommand::Verify {
                dir,
                manifests,
                jobs,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_verify(&cfg, &dir, manifests, jobs).await?;
            }
            CliCommand::List => run_list(),
            CliCommand::Checksum { path } => run_checksum(&path).await?,
            CliCommand::Completions { shell } => run_completions(shell),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
