//! Per-key JSON snapshots.
//!
//! Every live key also has an independently loadable file under a hashed
//! three-level directory tree:
//!
//! ```text
//! <db_path>/<db>/<h0h1>/<h2h3>/<h4h5>/<hash>.json
//! ```
//!
//! where `<hash>` is the hex blake3 digest of the key. The shard levels keep
//! any single directory from collecting too many files.
//!
//! Snapshots are kept in step with every mutation for out-of-band inspection.
//! They are not read at startup; the AOF is the restart source.

use crate::storage::entry::{unix_now, Entry, ValueType};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The on-disk snapshot of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Set on first write and never changed afterwards
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<i64>,
}

impl Cache {
    /// Builds a fresh snapshot record for `entry`, stamped `now`.
    pub fn from_entry(key: impl Into<String>, entry: &Entry, now: i64) -> Self {
        Self {
            key: key.into(),
            value: entry.value.clone(),
            value_type: entry.value_type,
            created_at: now,
            updated_at: now,
            expire_at: entry.expire_at,
        }
    }
}

/// Location of one key's snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPath {
    pub folder: PathBuf,
    pub file: PathBuf,
    pub filename: String,
}

impl SnapshotPath {
    pub fn new(root: &Path, key: &str) -> Self {
        let hash = hex::encode(blake3::hash(key.as_bytes()).as_bytes());
        let folder = root.join(&hash[0..2]).join(&hash[2..4]).join(&hash[4..6]);
        let filename = format!("{}.json", hash);

        Self {
            file: folder.join(&filename),
            folder,
            filename,
        }
    }
}

/// Reads and writes the snapshot tree of one database.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, key: &str) -> SnapshotPath {
        SnapshotPath::new(&self.root, key)
    }

    /// Returns the snapshot for `key`, or None if no file exists.
    pub fn read(&self, key: &str) -> Result<Option<Cache>> {
        let path = self.path(key);
        let data = match fs::read(&path.file) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&data)?))
    }

    /// Writes the snapshot for `key`.
    ///
    /// `created_at` is carried over from any existing snapshot and
    /// `updated_at` is set to the current time. Returns what was written.
    pub fn save(&self, key: &str, mut cache: Cache) -> Result<Cache> {
        match self.read(key) {
            Ok(Some(existing)) => cache.created_at = existing.created_at,
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable snapshot, resetting created_at");
            }
        }
        cache.updated_at = unix_now();

        let path = self.path(key);
        fs::create_dir_all(&path.folder)?;

        let data = serde_json::to_vec_pretty(&cache)?;
        let tmp = path.file.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path.file)?;

        debug!(key = %key, path = %path.file.display(), "Snapshot written");
        Ok(cache)
    }

    /// Removes the snapshot for `key`. A missing file is not an error.
    ///
    /// Returns true if a file was removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path(key);
        match fs::remove_file(&path.file) {
            Ok(()) => {
                debug!(key = %key, path = %path.file.display(), "Snapshot deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
