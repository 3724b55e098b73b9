pub mod config;
pub mod logging;

pub mod catalog;
pub mod checksum;
pub mod engine;
pub mod progress;
pub mod task;
pub mod template;

pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use checksum::{VerificationResult, Verifier};
pub use engine::{DownloadEngine, DownloadError};
pub use task::{DownloadTask, TaskStatus};
pub use template::UrlTemplate;
