//! Checksum manifest parsing and MD5 verification of downloaded files.
//!
//! A manifest (`checklist.chk`) holds lines of `<md5-hex>  <relative-path>`.
//! Paths are relative to the manifest's own directory. Verification runs
//! after the download batch and never stops on a bad line or an unreadable
//! file: both are logged and the pass moves on.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;

use md5::{Digest, Md5};
use walkdir::WalkDir;

use crate::task::{DownloadTask, TaskStatus};

/// Read size while hashing.
pub const BUF_SIZE: usize = 4096;

/// Length of an MD5 digest in hex.
pub const DIGEST_HEX_LEN: usize = 32;

/// File extension of checksum manifests.
pub const MANIFEST_EXTENSION: &str = "chk";

const SEPARATOR: &str = "  ";

/// Stand-in for a digest that could not be computed.
pub const UNREADABLE: &str = "<unreadable>";

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("{}:{line}: {reason}: {content:?}", .manifest.display())]
    Parse {
        manifest: PathBuf,
        line: usize,
        content: String,
        reason: &'static str,
    },
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One manifest line: expected digest plus the file it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    /// Lowercase hex digest.
    pub digest: String,
    /// Path as written in the manifest.
    pub relative_path: String,
    /// `relative_path` resolved against the manifest's directory.
    pub target: PathBuf,
}

/// Split one line at the last two-space separator. Paths may contain single
/// spaces; digests never contain any.
fn split_line(line: &str) -> Result<(&str, &str), &'static str> {
    let Some(at) = line.rfind(SEPARATOR) else {
        return Err("missing two-space separator");
    };
    let digest = &line[..at];
    let path = &line[at + SEPARATOR.len()..];
    if path.is_empty() {
        return Err("empty path");
    }
    if digest.len() != DIGEST_HEX_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("digest is not 32 hex characters");
    }
    Ok((digest, path))
}

/// Parse manifest text. Empty lines are skipped; malformed lines come back
/// as errors in place so the caller can log them and keep the rest.
pub fn parse_manifest(text: &str, manifest: &Path) -> Vec<Result<ChecksumRecord, ChecksumError>> {
    let base = manifest.parent().unwrap_or(Path::new(""));
    text.split('\n')
        .enumerate()
        .map(|(i, line)| (i + 1, line.strip_suffix('\r').unwrap_or(line)))
        .filter(|(_, line)| !line.is_empty())
        .map(|(number, line)| -> Result<ChecksumRecord, ChecksumError> {
            let (digest, path) = split_line(line).map_err(|reason| ChecksumError::Parse {
                manifest: manifest.to_path_buf(),
                line: number,
                content: line.to_string(),
                reason,
            })?;
            Ok(ChecksumRecord {
                digest: digest.to_ascii_lowercase(),
                relative_path: path.to_string(),
                target: base.join(path),
            })
        })
        .collect()
}

/// MD5 of a file as lowercase hex, reading `BUF_SIZE` bytes at a time.
pub fn md5_path(path: &Path) -> io::Result<String> {
    md5_path_with(path, |_| {})
}

/// Like [`md5_path`], reporting each chunk length to `on_chunk`.
pub fn md5_path_with(path: &Path, on_chunk: impl FnMut(u64)) -> io::Result<String> {
    hash_file(path, None, on_chunk)
}

/// Hash loop shared by the public helpers and the verifier. A set `abort`
/// stops between chunks with `ErrorKind::Interrupted`.
fn hash_file(
    path: &Path,
    abort: Option<&AtomicBool>,
    mut on_chunk: impl FnMut(u64),
) -> io::Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        if abort.is_some_and(|a| a.load(Ordering::Relaxed)) {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
        }
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        on_chunk(n as u64);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Outcome for one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub path: PathBuf,
    pub expected: String,
    /// `None` when the file could not be read.
    pub actual: Option<String>,
    pub matched: bool,
    pub error: Option<String>,
}

impl VerificationResult {
    fn new(path: PathBuf, expected: String, actual: io::Result<String>) -> Self {
        match actual {
            Ok(actual) => Self {
                matched: actual.eq_ignore_ascii_case(&expected),
                path,
                expected,
                actual: Some(actual),
                error: None,
            },
            Err(e) => Self {
                path,
                expected,
                actual: None,
                matched: false,
                error: Some(e.to_string()),
            },
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.matched {
            write!(f, "{} is OK", self.path.display())
        } else {
            write!(
                f,
                "{} | {} != {}",
                self.path.display(),
                self.expected,
                self.actual.as_deref().unwrap_or(UNREADABLE)
            )
        }
    }
}

/// Receiver of verification progress. Called from hashing threads.
pub trait VerifyObserver: Send + Sync {
    fn on_checking(&self, _path: &Path, _size: Option<u64>) {}
    fn on_progress(&self, _path: &Path, _delta: u64) {}
    fn on_result(&self, _result: &VerificationResult) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl VerifyObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct VerifierOptions {
    /// Files hashed at once. 1 hashes sequentially.
    pub jobs: usize,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

pub struct Verifier {
    observer: Arc<dyn VerifyObserver>,
    options: VerifierOptions,
    abort: Option<Arc<AtomicBool>>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(Arc::new(NoopObserver))
    }
}

impl Verifier {
    pub fn new(observer: Arc<dyn VerifyObserver>) -> Self {
        Self {
            observer,
            options: VerifierOptions::default(),
            abort: None,
        }
    }

    pub fn with_options(mut self, options: VerifierOptions) -> Self {
        self.options = options;
        self
    }

    /// Token checked between chunks. Once set, the file being hashed and
    /// every file not yet started come back unmatched with a `cancelled` error.
    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = Some(abort);
        self
    }

    fn is_aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|a| a.load(Ordering::Relaxed))
    }

    /// Verify every file listed by `manifests`.
    pub fn verify(&self, manifests: &[PathBuf]) -> Vec<VerificationResult> {
        let records = self.collect_records(manifests);
        self.verify_records(&records)
    }

    /// Read and parse manifests, deduplicated by target path. A later record
    /// for the same target replaces the earlier one but keeps its position.
    pub fn collect_records(&self, manifests: &[PathBuf]) -> Vec<ChecksumRecord> {
        let mut records: Vec<ChecksumRecord> = Vec::new();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();

        for manifest in manifests {
            let text = match fs::read_to_string(manifest) {
                Ok(t) => t,
                Err(source) => {
                    let e = ChecksumError::Read {
                        path: manifest.clone(),
                        source,
                    };
                    tracing::error!("skipping manifest: {e}");
                    continue;
                }
            };
            for parsed in parse_manifest(&text, manifest) {
                let record = match parsed {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("skipping line: {e}");
                        continue;
                    }
                };
                match index.get(&record.target) {
                    Some(&at) => {
                        tracing::warn!(
                            path = %record.target.display(),
                            previous = %records[at].digest,
                            digest = %record.digest,
                            manifest = %manifest.display(),
                            "duplicate checksum record, last one wins"
                        );
                        records[at] = record;
                    }
                    None => {
                        index.insert(record.target.clone(), records.len());
                        records.push(record);
                    }
                }
            }
        }
        records
    }

    /// Hash each record's target and compare. Results keep record order.
    pub fn verify_records(&self, records: &[ChecksumRecord]) -> Vec<VerificationResult> {
        let jobs = self.options.jobs.max(1).min(records.len().max(1));
        if jobs == 1 {
            return records.iter().map(|r| self.check(r)).collect();
        }

        let work: Mutex<VecDeque<(usize, &ChecksumRecord)>> =
            Mutex::new(records.iter().enumerate().collect());
        let mut slots: Vec<Option<VerificationResult>> = vec![None; records.len()];

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            for _ in 0..jobs {
                let tx = tx.clone();
                let work = &work;
                scope.spawn(move || loop {
                    let next = work.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some((i, record)) = next else {
                        break;
                    };
                    let _ = tx.send((i, self.check(record)));
                });
            }
            drop(tx);
            for (i, result) in rx {
                slots[i] = Some(result);
            }
        });

        slots
            .into_iter()
            .zip(records)
            .map(|(slot, record)| {
                slot.unwrap_or_else(|| {
                    let err = io::Error::new(io::ErrorKind::Other, "hashing thread died");
                    VerificationResult::new(record.target.clone(), record.digest.clone(), Err(err))
                })
            })
            .collect()
    }

    fn check(&self, record: &ChecksumRecord) -> VerificationResult {
        let path = &record.target;
        if self.is_aborted() {
            tracing::debug!(path = %path.display(), "verification cancelled");
            let err = io::Error::new(io::ErrorKind::Interrupted, "cancelled");
            return VerificationResult::new(path.clone(), record.digest.clone(), Err(err));
        }
        let size = fs::metadata(path).ok().map(|m| m.len());
        self.observer.on_checking(path, size);

        let actual = hash_file(path, self.abort.as_deref(), |n| {
            self.observer.on_progress(path, n)
        });
        match &actual {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                tracing::debug!(path = %path.display(), "verification cancelled");
            }
            Err(e) => tracing::error!(path = %path.display(), "cannot hash: {e}"),
            Ok(_) => {}
        }

        let result = VerificationResult::new(path.clone(), record.digest.clone(), actual);
        if result.matched {
            tracing::info!("{result}");
        } else {
            tracing::error!("{result}");
        }
        self.observer.on_result(&result);
        result
    }
}

/// Finished downloads that are checksum manifests.
pub fn manifests_among(tasks: &[DownloadTask]) -> Vec<PathBuf> {
    tasks
        .iter()
        .filter(|t| is_manifest(&t.destination))
        .filter(|t| {
            let done = t.status() == TaskStatus::Finished;
            if !done {
                tracing::warn!(path = %t.destination.display(), "manifest not downloaded, skipping");
            }
            done
        })
        .map(|t| t.destination.clone())
        .collect()
}

/// All manifests under `dir`, recursively, sorted by path. Symlinked
/// directories are not entered.
pub fn discover_manifests(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() && is_manifest(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

fn is_manifest(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == MANIFEST_EXTENSION)
}
