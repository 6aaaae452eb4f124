//! Raw ingestion log writer.
//!
//! The listener is the only writer. Entries are appended in receipt order,
//! one line per message, and never rewritten.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::{split_datagram, RawMessage, Result, TORN_LINE_MARKER};

/// Append-only handle on the raw log.
pub struct RawLogWriter {
    path: PathBuf,
    file: File,
}

impl RawLogWriter {
    /// Open (creating if needed) the raw log for appending.
    ///
    /// If a previous writer died mid-line, the dangling fragment is closed
    /// with [`TORN_LINE_MARKER`] and a newline so it cannot fuse with the
    /// next entry and is rejected rather than parsed as a shorter message.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        if ends_mid_line(&mut file)? {
            tracing::warn!(path = %path.display(), "raw log ends mid-line, terminating fragment");
            file.write_all(&[TORN_LINE_MARKER, b'\n'])?;
            file.flush()?;
        }

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one message as a single line and flush it to the OS.
    pub fn append(&mut self, message: &RawMessage) -> Result<()> {
        self.file.write_all(message.to_log_line().as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Append every non-empty line of a datagram with the same receipt time.
    ///
    /// Returns the number of raw log entries written.
    pub fn append_datagram(
        &mut self,
        receipt_time: DateTime<Utc>,
        source_address: &str,
        text: &str,
    ) -> Result<usize> {
        let lines = split_datagram(text);
        for line in &lines {
            self.append(&RawMessage::new(receipt_time, source_address, *line))?;
        }
        Ok(lines.len())
    }
}

fn ends_mid_line(file: &mut File) -> Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
