//! CLI command handlers, one file per command.

mod checksum;
mod completions;
mod download;
mod list;
mod verify;

pub use checksum::run_checksum;
pub use completions::run_completions;
pub use download::{run_download, DownloadRequest};
pub use list::run_list;
pub use verify::run_verify;
