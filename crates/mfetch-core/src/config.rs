use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checksum::VerifierOptions;
use crate::engine::{EngineOptions, RequestHeaders, CHUNK_SIZE};

/// Global configuration loaded from `~/.config/mfetch/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MfetchConfig {
    /// Cap on transfers in flight. Absent means one thread per file.
    pub max_concurrent_downloads: Option<usize>,
    pub connect_timeout_secs: u64,
    /// Whole-request timeout. Absent means no limit.
    pub request_timeout_secs: Option<u64>,
    /// Files hashed in parallel during verification.
    pub verify_jobs: usize,
    pub user_agent: String,
    pub referer: String,
}

impl Default for MfetchConfig {
    fn default() -> Self {
        let headers = RequestHeaders::default();
        Self {
            max_concurrent_downloads: None,
            connect_timeout_secs: 30,
            request_timeout_secs: None,
            verify_jobs: 1,
            user_agent: headers.user_agent,
            referer: headers.referer,
        }
    }
}

impl MfetchConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_concurrent: self.max_concurrent_downloads.filter(|&n| n > 0),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Fixed headers with the configurable ones swapped in.
    pub fn request_headers(&self) -> RequestHeaders {
        RequestHeaders {
            user_agent: self.user_agent.clone(),
            referer: self.referer.clone(),
            ..RequestHeaders::default()
        }
    }

    pub fn verifier_options(&self) -> VerifierOptions {
        VerifierOptions {
            jobs: self.verify_jobs.max(1),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MfetchConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<MfetchConfig> {
    if !path.exists() {
        let default_cfg = MfetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: MfetchConfig = toml::from_str(&data)?;
    Ok(cfg)
}
