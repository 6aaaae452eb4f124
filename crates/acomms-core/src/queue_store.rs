//! Per-queue append-only record files.
//!
//! Layout: `<dir>/<queue>.jsonl`, one canonical [`ParsedRecord`] per line.
//!
//! The classifier is the only writer. It commits the length of every queue
//! file to its cursor after each append; bytes past the committed length
//! belong to a line the cursor never recorded and are rolled back before
//! that line is classified again.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::domain::{AcommsError, ParsedRecord, QueueType, Result};

/// Path of `queue`'s file inside `dir`.
pub fn queue_path(dir: &Path, queue: QueueType) -> PathBuf {
    dir.join(queue.file_name())
}

/// Writer over every queue file in one directory.
pub struct QueueStore {
    dir: PathBuf,
    handles: BTreeMap<QueueType, File>,
    lengths: BTreeMap<QueueType, u64>,
}

impl QueueStore {
    /// Open the store, noting the current length of every queue file.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut lengths = BTreeMap::new();
        for queue in QueueType::ALL {
            lengths.insert(queue, file_len(&queue_path(&dir, queue))?);
        }

        Ok(Self {
            dir,
            handles: BTreeMap::new(),
            lengths,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, queue: QueueType) -> PathBuf {
        queue_path(&self.dir, queue)
    }

    /// Current length in bytes of `queue`'s file.
    pub fn len(&self, queue: QueueType) -> u64 {
        self.lengths.get(&queue).copied().unwrap_or(0)
    }

    /// Cut every queue file back to its committed length.
    ///
    /// Queues absent from `committed` roll back to empty. A file shorter
    /// than its committed length was replaced or truncated underneath the
    /// classifier, which is fatal.
    pub fn rollback(&mut self, committed: &BTreeMap<QueueType, u64>) -> Result<()> {
        for queue in QueueType::ALL {
            let want = committed.get(&queue).copied().unwrap_or(0);
            let have = self.len(queue);
            let path = self.path(queue);
            if have < want {
                return Err(AcommsError::QueueBehindCursor {
                    path,
                    committed: want,
                    len: have,
                });
            }
            if have > want {
                tracing::warn!(
                    path = %path.display(),
                    dropped_bytes = have - want,
                    "rolling back uncommitted queue records"
                );
                self.handles.remove(&queue);
                OpenOptions::new().write(true).open(&path)?.set_len(want)?;
                self.lengths.insert(queue, want);
            }
        }
        Ok(())
    }

    /// Append `record` to its queue and return the file's new length.
    pub fn append(&mut self, record: &ParsedRecord) -> Result<u64> {
        let mut line = record.to_line()?;
        line.push('\n');

        let file = match self.handles.entry(record.queue) {
            std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::btree_map::Entry::Vacant(e) => {
                let path = queue_path(&self.dir, record.queue);
                e.insert(OpenOptions::new().create(true).append(true).open(path)?)
            }
        };
        file.write_all(line.as_bytes())?;
        file.flush()?;

        let len = self.len(record.queue) + line.len() as u64;
        self.lengths.insert(record.queue, len);
        Ok(len)
    }

    /// Delete every queue file in `dir`.
    pub fn clear(dir: impl AsRef<Path>) -> Result<()> {
        for queue in QueueType::ALL {
            match fs::remove_file(queue_path(dir.as_ref(), queue)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn file_len(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// SHA-256 hex digest of every queue file present in `dir`.
///
/// Two classifier runs over the same raw log must produce identical maps.
pub fn digest_queue_files(dir: &Path) -> Result<BTreeMap<QueueType, String>> {
    let mut digests = BTreeMap::new();
    for queue in QueueType::ALL {
        match fs::read(queue_path(dir, queue)) {
            Ok(bytes) => {
                digests.insert(queue, hex::encode(Sha256::digest(&bytes)));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(digests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldValue;
    use chrono::{TimeZone, Utc};

    fn record(queue: QueueType, line: u64) -> ParsedRecord {
        ParsedRecord::new(Utc.with_ymd_and_hms(2021, 10, 3, 12, 0, 0).unwrap(), queue, line)
            .with_field("battery", FieldValue::Int(80 + line as i64))
    }

    #[test]
    fn append_returns_new_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = QueueStore::open(dir.path()).unwrap();
        let first = store.append(&record(QueueType::Status, 0)).unwrap();
        let second = store.append(&record(QueueType::Status, 3)).unwrap();
        assert!(second > first);

        let content = fs::read_to_string(store.path(QueueType::Status)).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(content.len() as u64, second);
        assert_eq!(store.len(QueueType::Science), 0);
        assert!(!store.path(QueueType::Science).exists());
    }

    #[test]
    fn lengths_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let written = {
            let mut store = QueueStore::open(dir.path()).unwrap();
            store.append(&record(QueueType::Status, 5)).unwrap()
        };
        let mut store = QueueStore::open(dir.path()).unwrap();
        assert_eq!(store.len(QueueType::Status), written);
        assert_eq!(
            store.append(&record(QueueType::Status, 6)).unwrap(),
            written * 2
        );
    }

    #[test]
    fn rollback_cuts_uncommitted_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = QueueStore::open(dir.path()).unwrap();
        let committed = store.append(&record(QueueType::Status, 1)).unwrap();
        store.append(&record(QueueType::Status, 2)).unwrap();
        store.append(&record(QueueType::Science, 2)).unwrap();
        drop(store);

        let mut store = QueueStore::open(dir.path()).unwrap();
        store
            .rollback(&BTreeMap::from([(QueueType::Status, committed)]))
            .unwrap();
        let good = record(QueueType::Status, 1).to_line().unwrap();
        let path = queue_path(dir.path(), QueueType::Status);
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{good}\n"));
        assert_eq!(store.len(QueueType::Science), 0);

        store.append(&record(QueueType::Status, 2)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn rollback_truncates_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(dir.path(), QueueType::Status);
        let good = record(QueueType::Status, 1).to_line().unwrap();
        fs::write(&path, format!("{good}\n{{\"timestamp\":\"20")).unwrap();

        let mut store = QueueStore::open(dir.path()).unwrap();
        let committed = good.len() as u64 + 1;
        store
            .rollback(&BTreeMap::from([(QueueType::Status, committed)]))
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{good}\n"));
    }

    #[test]
    fn queue_shorter_than_commit_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = QueueStore::open(dir.path()).unwrap();
        let err = store
            .rollback(&BTreeMap::from([(QueueType::Ship, 512)]))
            .unwrap_err();
        assert!(matches!(
            err,
            AcommsError::QueueBehindCursor {
                committed: 512,
                len: 0,
                ..
            }
        ));
    }

    #[test]
    fn digests_are_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = QueueStore::open(dir.path()).unwrap();
        store.append(&record(QueueType::Science, 2)).unwrap();

        let a = digest_queue_files(dir.path()).unwrap();
        let b = digest_queue_files(dir.path()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        assert_eq!(a[&QueueType::Science].len(), 64);

        QueueStore::clear(dir.path()).unwrap();
        assert!(digest_queue_files(dir.path()).unwrap().is_empty());
    }
}
