//! Persisted classifier position in the raw log.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::domain::{QueueType, Result};
use crate::tail::TailLine;

/// Byte offset and line count of the first raw log line not yet processed,
/// plus the queue file lengths written up to that line.
///
/// Storing the cursor is the commit point for both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierCursor {
    pub offset: u64,
    pub line: u64,
    #[serde(default)]
    pub queues: BTreeMap<QueueType, u64>,
}

impl ClassifierCursor {
    /// Move past `line`.
    pub fn advance_past(&mut self, line: &TailLine) {
        self.offset = line.end;
        self.line = line.index + 1;
    }
}

/// Small JSON file holding a [`ClassifierCursor`].
#[derive(Debug, Clone)]
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted cursor; a missing file means start of log.
    pub fn load(&self) -> Result<ClassifierCursor> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ClassifierCursor::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the cursor.
    ///
    /// Atomic write: temp file in the same directory, then rename, so a
    /// reader never sees a half-written cursor.
    pub fn store(&self, cursor: &ClassifierCursor) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&serde_json::to_vec(cursor)?)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Forget the persisted position so the next run starts from the top.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
