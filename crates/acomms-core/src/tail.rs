//! Read-tail access to append-only line files.
//!
//! Readers only ever consume complete, newline-terminated lines. A trailing
//! fragment without `\n` belongs to a write still in progress and is left
//! for the next poll.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::domain::Result;

/// One complete line read from a tailed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLine {
    /// Zero-based line index within the file.
    pub index: u64,
    /// Byte offset of the first byte of the line.
    pub start: u64,
    /// Byte offset just past the terminating `\n`.
    pub end: u64,
    /// Line content without `\n` (and without a trailing `\r`).
    pub bytes: Vec<u8>,
}

impl TailLine {
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// Outcome of reading a file from a known position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailRead {
    /// The file does not exist (yet).
    Missing,
    /// The file is shorter than the requested offset.
    Truncated { len: u64 },
    /// Complete lines found past the offset, possibly none.
    Lines(Vec<TailLine>),
}

/// Read every complete line of `path` starting at byte `offset`.
///
/// `first_index` is the line index of the line starting at `offset`.
pub fn read_complete_lines(path: &Path, offset: u64, first_index: u64) -> Result<TailRead> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TailRead::Missing),
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata()?.len();
    if len < offset {
        return Ok(TailRead::Truncated { len });
    }
    if len == offset {
        return Ok(TailRead::Lines(Vec::new()));
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity((len - offset) as usize);
    file.read_to_end(&mut buf)?;

    let mut lines = Vec::new();
    let mut start = 0usize;
    let mut index = first_index;
    while let Some(pos) = buf[start..].iter().position(|b| *b == b'\n') {
        let end = start + pos;
        let mut content = &buf[start..end];
        if content.last() == Some(&b'\r') {
            content = &content[..content.len() - 1];
        }
        lines.push(TailLine {
            index,
            start: offset + start as u64,
            end: offset + end as u64 + 1,
            bytes: content.to_vec(),
        });
        index += 1;
        start = end + 1;
    }

    Ok(TailRead::Lines(lines))
}

/// Stateful tail over one file, advancing past every line it returns.
#[derive(Debug, Clone)]
pub struct LineTail {
    path: PathBuf,
    offset: u64,
    line: u64,
}

/// Lines returned by one [`LineTail::poll`].
#[derive(Debug, Default)]
pub struct TailPoll {
    pub lines: Vec<TailLine>,
    /// The file shrank or was replaced; reading restarted from the top.
    pub restarted: bool,
}

impl LineTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            line: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    /// Collect complete lines appended since the previous poll.
    ///
    /// A missing file yields nothing. A file shorter than the current
    /// position is read again from the start and flagged as `restarted`.
    pub fn poll(&mut self) -> Result<TailPoll> {
        let mut restarted = false;
        let lines = match read_complete_lines(&self.path, self.offset, self.line)? {
            TailRead::Missing => Vec::new(),
            TailRead::Lines(lines) => lines,
            TailRead::Truncated { len } => {
                tracing::warn!(
                    path = %self.path.display(),
                    offset = self.offset,
                    len = len,
                    "tailed file shrank, restarting from the beginning"
                );
                restarted = true;
                self.offset = 0;
                self.line = 0;
                match read_complete_lines(&self.path, 0, 0)? {
                    TailRead::Lines(lines) => lines,
                    TailRead::Missing | TailRead::Truncated { .. } => Vec::new(),
                }
            }
        };

        if let Some(last) = lines.last() {
            self.offset = last.end;
            self.line = last.index + 1;
        }
        Ok(TailPoll { lines, restarted })
    }
}
