//! Append-Only File (AOF)
//!
//! Each database owns one journal at `<db_path>/aof/db_<N>.aof`. Every
//! mutation is written as one newline-delimited JSON record and the file is
//! synced before [`AofWriter::append`] returns, so an acknowledged write is on
//! stable storage.
//!
//! ```text
//! {"timestamp":1718000000,"command":"SET","key":"foo","value":"123"}
//! {"timestamp":1718000003,"command":"SET","key":"baz","value":"hi","expire_at":1718000005}
//! {"timestamp":1718000009,"command":"DEL","key":"foo"}
//! ```
//!
//! On open the journal is replayed front to back to rebuild the in-memory
//! map. Lines that fail to parse are skipped with a warning.
//!
//! The log is never compacted; it grows for as long as the database is used.

use crate::storage::entry::{unix_now, Entry};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Mutation kind recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AofCommand {
    Set,
    Del,
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AofRecord {
    /// When the record was written (unix seconds)
    pub timestamp: i64,
    pub command: AofCommand,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Absolute expiry of the written entry (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<i64>,
}

impl AofRecord {
    pub fn set(key: impl Into<String>, value: impl Into<String>, expire_at: Option<i64>) -> Self {
        Self {
            timestamp: unix_now(),
            command: AofCommand::Set,
            key: key.into(),
            value: Some(value.into()),
            expire_at,
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self {
            timestamp: unix_now(),
            command: AofCommand::Del,
            key: key.into(),
            value: None,
            expire_at: None,
        }
    }
}

/// Appends records to one database's journal.
///
/// The file handle sits behind its own lock, so concurrent appends never
/// interleave within a line.
#[derive(Debug)]
pub struct AofWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl AofWriter {
    /// Opens (creating if needed) the journal at `path` in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "AOF file opened");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Opens an existing journal without write access, so every append fails.
    #[cfg(test)]
    pub(crate) fn open_read_only(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serializes `record` as one line and forces it to disk.
    pub fn append(&self, record: &AofRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file();
        file.write_all(&line)?;
        file.sync_data()?;

        debug!(path = %self.path.display(), key = %record.key, command = ?record.command, "AOF record appended");
        Ok(())
    }

    pub fn append_set(&self, key: &str, value: &str, expire_at: Option<i64>) -> Result<()> {
        self.append(&AofRecord::set(key, value, expire_at))
    }

    pub fn append_del(&self, key: &str) -> Result<()> {
        self.append(&AofRecord::del(key))
    }

    /// Flushes file metadata as well as data. Called at shutdown.
    pub fn sync(&self) -> Result<()> {
        self.file().sync_all()?;
        Ok(())
    }
}

/// Result of replaying a journal.
#[derive(Debug, Default)]
pub struct Replay {
    /// Live entries after applying every record
    pub entries: HashMap<String, Entry>,
    /// Records applied
    pub applied: usize,
    /// Lines that could not be parsed
    pub skipped: usize,
}

/// Rebuilds the entry map from the journal at `path`.
///
/// A missing file yields an empty map. SET records whose expiry has already
/// passed are dropped (and remove any earlier value for that key).
pub fn replay(path: &Path) -> Result<Replay> {
    replay_at(path, unix_now())
}

pub(crate) fn replay_at(path: &Path, now: i64) -> Result<Replay> {
    let mut replay = Replay::default();

    if !path.exists() {
        info!(path = %path.display(), "AOF file not found, starting with empty database");
        return Ok(replay);
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        line_no += 1;

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        let record: AofRecord = match serde_json::from_slice(trimmed) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), line = line_no, error = %e, "Skipping unparsable AOF line");
                replay.skipped += 1;
                continue;
            }
        };

        match record.command {
            AofCommand::Set => {
                let Some(value) = record.value else {
                    warn!(path = %path.display(), line = line_no, "Skipping SET record without a value");
                    replay.skipped += 1;
                    continue;
                };
                let entry = match record.expire_at {
                    Some(exp) if now >= exp => {
                        replay.entries.remove(&record.key);
                        replay.applied += 1;
                        continue;
                    }
                    Some(exp) => Entry::with_expire_at(value, exp),
                    None => Entry::new(value),
                };
                replay.entries.insert(record.key, entry);
            }
            AofCommand::Del => {
                replay.entries.remove(&record.key);
            }
        }
        replay.applied += 1;
    }

    info!(
        path = %path.display(),
        keys = replay.entries.len(),
        applied = replay.applied,
        skipped = replay.skipped,
        "Loaded keys from AOF file"
    );
    Ok(replay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entry::ValueType;
    use tempfile::TempDir;

    fn journal(dir: &TempDir) -> PathBuf {
        dir.path().join("aof").join("db_0.aof")
    }

    #[test]
    fn test_record_format() {
        let record = AofRecord {
            timestamp: 10,
            command: AofCommand::Set,
            key: "k".into(),
            value: Some("v".into()),
            expire_at: None,
        };
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"timestamp":10,"command":"SET","key":"k","value":"v"}"#
        );

        let del = AofRecord {
            timestamp: 11,
            ..AofRecord::del("k")
        };
        assert_eq!(
            serde_json::to_string(&del).unwrap(),
            r#"{"timestamp":11,"command":"DEL","key":"k"}"#
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let replay = replay(&journal(&dir)).unwrap();
        assert!(replay.entries.is_empty());
        assert_eq!(replay.applied, 0);
    }

    #[test]
    fn test_append_then_replay() {
        let dir = TempDir::new().unwrap();
        let path = journal(&dir);

        let writer = AofWriter::open(&path).unwrap();
        writer.append_set("a", "1", None).unwrap();
        writer.append_set("b", r#"{"x":1}"#, None).unwrap();
        writer.append_set("a", "2", None).unwrap();
        writer.append_del("b").unwrap();
        writer.append_set("c", "[1]", None).unwrap();
        drop(writer);

        let replay = replay(&path).unwrap();
        assert_eq!(replay.applied, 5);
        assert_eq!(replay.entries.len(), 2);
        assert_eq!(replay.entries["a"].value, "2");
        assert_eq!(replay.entries["a"].value_type, ValueType::Int);
        assert_eq!(replay.entries["c"].value_type, ValueType::Array);
        assert!(!replay.entries.contains_key("b"));
    }

    #[test]
    fn test_replay_drops_expired() {
        let dir = TempDir::new().unwrap();
        let path = journal(&dir);

        let writer = AofWriter::open(&path).unwrap();
        writer.append_set("stale", "x", Some(100)).unwrap();
        writer.append_set("fresh", "y", Some(300)).unwrap();
        writer.append_set("keep", "z", None).unwrap();
        writer.append_set("keep", "z2", Some(150)).unwrap();

        let replay = replay_at(&path, 200).unwrap();
        assert!(!replay.entries.contains_key("stale"));
        assert_eq!(replay.entries["fresh"].expire_at, Some(300));
        // a later expired SET hides the earlier persistent value
        assert!(!replay.entries.contains_key("keep"));
    }

    #[test]
    fn test_replay_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let path = journal(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            concat!(
                "{\"timestamp\":1,\"command\":\"SET\",\"key\":\"a\",\"value\":\"1\"}\n",
                "not json at all\n",
                "\n",
                "{\"timestamp\":2,\"command\":\"SET\",\"key\":\"b\",\"value\":{\"seconds\":5}}\n",
                "{\"timestamp\":3,\"command\":\"SET\",\"key\":\"c\",\"value\":\"3\"}",
            ),
        )
        .unwrap();

        let replay = replay(&path).unwrap();
        assert_eq!(replay.skipped, 2);
        assert_eq!(replay.entries.len(), 2);
        assert_eq!(replay.entries["c"].value, "3");
    }

    #[test]
    fn test_append_is_durable_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = journal(&dir);

        AofWriter::open(&path).unwrap().append_set("k", "v1", None).unwrap();
        AofWriter::open(&path).unwrap().append_set("k", "v2", None).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert_eq!(replay(&path).unwrap().entries["k"].value, "v2");
    }
}
