//! One task's HTTP GET, streamed to its destination file.
//!
//! The destination is opened lazily on the first body chunk of a 2xx
//! response, so a rejected request never creates or truncates a file.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Write};
use std::str;

use super::error::DownloadError;
use super::response::{ResponseHead, StatusLine};
use super::DownloadEngine;
use crate::task::DownloadTask;

/// Why the write callback stopped the transfer.
enum Halt {
    Status(StatusLine),
    Disk(io::Error),
    Cancelled,
}

struct Stream<'a> {
    engine: &'a DownloadEngine,
    task: &'a mut DownloadTask,
    head: ResponseHead,
    file: Option<File>,
    halt: Option<Halt>,
}

impl Stream<'_> {
    fn on_header(&mut self, data: &[u8]) {
        if let Ok(line) = str::from_utf8(data) {
            self.head.push_line(line);
        }
    }

    /// Returns the number of bytes consumed; anything short of `data.len()`
    /// makes curl abort the transfer.
    fn on_body(&mut self, data: &[u8]) -> usize {
        if self.engine.is_aborted() {
            self.halt = Some(Halt::Cancelled);
            return 0;
        }
        if self.file.is_none() {
            let status = self.head.status.clone().unwrap_or(StatusLine {
                code: 0,
                reason: "no status line".to_string(),
            });
            if let Err(halt) = self.open(status) {
                self.halt = Some(halt);
                return 0;
            }
        }
        let Some(file) = self.file.as_mut() else {
            return 0;
        };
        if let Err(e) = file.write_all(data) {
            self.halt = Some(Halt::Disk(e));
            return 0;
        }

        let delta = data.len() as u64;
        if let Err(e) = self.task.advance(delta) {
            tracing::error!("{e}");
        }
        self.engine.sink.on_advanced(self.task, delta);
        data.len()
    }

    /// Check the final status, move the task to InProgress and open the destination.
    fn open(&mut self, status: StatusLine) -> Result<(), Halt> {
        if !status.is_success() {
            return Err(Halt::Status(status));
        }
        let total = self.head.content_length;
        if let Err(e) = self.task.start(total) {
            tracing::error!("{e}");
        }
        self.engine.sink.on_started(self.task, total);

        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.task.destination)
            .map_err(Halt::Disk)?;
        self.file = Some(file);
        Ok(())
    }
}

impl Halt {
    fn into_error(self, task: &DownloadTask) -> DownloadError {
        match self {
            Halt::Status(s) => DownloadError::HttpStatus {
                code: s.code,
                reason: s.reason,
                url: task.source_url.clone(),
            },
            Halt::Disk(source) => DownloadError::DiskWrite {
                path: task.destination.clone(),
                source,
            },
            Halt::Cancelled => DownloadError::Cancelled,
        }
    }
}

/// Runs the GET for `task`. On success the task is InProgress with every
/// byte accounted for, and the final status code is returned.
pub(super) fn fetch(engine: &DownloadEngine, task: &mut DownloadTask) -> Result<u32, DownloadError> {
    if engine.is_aborted() {
        return Err(DownloadError::Cancelled);
    }

    let mut easy = curl::easy::Easy::new();
    easy.url(&task.source_url)?;
    easy.get(true)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    // Caps each write callback at one chunk.
    easy.buffer_size(engine.options.chunk_size)?;
    easy.connect_timeout(engine.options.connect_timeout)?;
    if let Some(timeout) = engine.options.request_timeout {
        easy.timeout(timeout)?;
    }
    let mut list = curl::easy::List::new();
    for header in engine.headers.lines() {
        list.append(&header)?;
    }
    easy.http_headers(list)?;

    let stream = RefCell::new(Stream {
        engine,
        task,
        head: ResponseHead::default(),
        file: None,
        halt: None,
    });

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            stream.borrow_mut().on_header(data);
            true
        })?;
        transfer.write_function(|data| Ok(stream.borrow_mut().on_body(data)))?;
        transfer.perform()
    };

    let mut stream = stream.into_inner();
    if let Some(halt) = stream.halt.take() {
        return Err(halt.into_error(stream.task));
    }
    performed?;

    let status = match stream.head.status.clone() {
        Some(s) => s,
        None => StatusLine {
            code: easy.response_code()?,
            reason: String::new(),
        },
    };
    let code = status.code;
    // Empty bodies never reach the write callback.
    if stream.file.is_none() {
        if let Err(halt) = stream.open(status) {
            return Err(halt.into_error(stream.task));
        }
    }
    finish_file(stream, code)
}

fn finish_file(stream: Stream<'_>, code: u32) -> Result<u32, DownloadError> {
    if let Some(file) = stream.file {
        file.sync_all().map_err(|source| DownloadError::DiskWrite {
            path: stream.task.destination.clone(),
            source,
        })?;
    }
    if let Some(expected) = stream.task.total_bytes() {
        if expected != stream.task.bytes_transferred() {
            tracing::warn!(
                file = %stream.task.file_name,
                expected,
                received = stream.task.bytes_transferred(),
                "body length differs from Content-Length"
            );
        }
    }
    Ok(code)
}
