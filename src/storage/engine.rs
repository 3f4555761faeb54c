//! Database Store
//!
//! The engine owns up to [`NUM_DATABASES`] databases. Each one has its own
//! entry map, AOF journal and snapshot tree. A database is opened (and its
//! journal replayed) the first time anything refers to it, then stays open
//! for the life of the process.
//!
//! ## Locking
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  StorageEngine                           │
//! │   Mutex ─┬─ db 0: HashMap + AofWriter(Mutex<File>) + ... │
//! │          ├─ db 1: (not opened yet)                       │
//! │          └─ ...                                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! One lock guards every open database. Every operation holds it for its
//! whole duration, reads included, because a read may evict an expired entry
//! (memory, journal and snapshot). The journal's own file lock nests inside
//! it. A key's in-memory update, its AOF record and its snapshot write are
//! therefore atomic with respect to every other observer.
//!
//! ## Write ordering
//!
//! SET, DEL, EXPIRE and PERSIST append to the journal before touching
//! memory, so a failed append leaves both unchanged. Snapshot writes come
//! last and are not rolled back on failure; the journal stays authoritative
//! and the next replay converges.

use crate::config::Config;
use crate::storage::aof::{self, AofWriter};
use crate::storage::entry::{unix_now, Entry, ValueType};
use crate::storage::glob::GlobPattern;
use crate::storage::snapshot::{Cache, SnapshotStore};
use crate::{Error, Result, NUM_DATABASES};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Outcome of a read that may have evicted an expired entry on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed<T> {
    /// The live value, if any
    pub value: Option<T>,
    /// True if the read found an expired entry and evicted it
    pub evicted: bool,
}

impl<T> Observed<T> {
    fn live(value: T) -> Self {
        Self {
            value: Some(value),
            evicted: false,
        }
    }

    fn missing() -> Self {
        Self {
            value: None,
            evicted: false,
        }
    }

    fn evicted() -> Self {
        Self {
            value: None,
            evicted: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Observed<U> {
        Observed {
            value: self.value.map(f),
            evicted: self.evicted,
        }
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// No such key (or it just expired)
    Missing,
    /// The key exists and never expires
    Persistent,
    /// Seconds until the key expires
    Expires(i64),
}

impl Ttl {
    /// Redis-style integer code: -2 missing, -1 persistent, else seconds.
    pub fn as_code(&self) -> i64 {
        match self {
            Ttl::Missing => -2,
            Ttl::Persistent => -1,
            Ttl::Expires(secs) => *secs,
        }
    }
}

/// Absolute expiry `ttl` seconds after `now`, pinned at `i64::MAX`.
fn expire_at_after(now: i64, ttl: u64) -> i64 {
    i64::try_from(ttl).map_or(i64::MAX, |secs| now.saturating_add(secs))
}

/// Keys evicted by one reaper sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// (database id, keys evicted) for every database with at least one eviction
    pub per_db: Vec<(usize, u64)>,
    pub total: u64,
}

/// One open database.
#[derive(Debug)]
struct Database {
    id: usize,
    entries: HashMap<String, Entry>,
    aof: AofWriter,
    snapshots: SnapshotStore,
}

impl Database {
    /// Replays the journal, then opens it for appending.
    fn open(config: &Config, id: usize) -> Result<Self> {
        let path = config.aof_path(id);
        let replay = aof::replay(&path)?;
        let aof = AofWriter::open(&path)?;

        Ok(Self {
            id,
            entries: replay.entries,
            aof,
            snapshots: SnapshotStore::new(config.snapshot_root(id)),
        })
    }

    /// Removes an entry that has reached its expiry.
    ///
    /// The entry leaves memory first; it is logically gone either way. The
    /// snapshot delete is best-effort.
    fn evict(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        self.aof.append_del(key)?;
        if let Err(e) = self.snapshots.delete(key) {
            warn!(db = self.id, key = %key, error = %e, "Failed to delete snapshot of expired key");
        }
        debug!(db = self.id, key = %key, "Evicted expired key");
        Ok(())
    }

    /// Looks up `key`, evicting it if its expiry has passed.
    fn observe(&mut self, key: &str, now: i64) -> Result<Observed<&Entry>> {
        let expired = match self.entries.get(key) {
            None => return Ok(Observed::missing()),
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            self.evict(key)?;
            return Ok(Observed::evicted());
        }

        Ok(self
            .entries
            .get(key)
            .map(Observed::live)
            .unwrap_or_else(Observed::missing))
    }

    fn expired_keys(&self, now: i64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Rewrites the snapshot for `key` from its current entry, keeping the
    /// original `created_at`.
    fn save_snapshot(&self, key: &str, now: i64) -> Result<()> {
        if let Some(entry) = self.entries.get(key) {
            self.snapshots.save(key, Cache::from_entry(key, entry, now))?;
        }
        Ok(())
    }
}

/// The storage engine shared by every session.
///
/// Wrap it in an `Arc` and hand a clone to each connection task and to the
/// reaper.
///
/// # Example
///
/// ```no_run
/// use jsondb::config::Config;
/// use jsondb::storage::StorageEngine;
///
/// let engine = StorageEngine::open(Config::new("./data")).unwrap();
/// engine.set(0, "name", "jsondb", None).unwrap();
/// assert_eq!(engine.get(0, "name").unwrap(), Some("jsondb".to_string()));
/// ```
pub struct StorageEngine {
    config: Config,

    /// One slot per database id; `None` until first use
    databases: Mutex<Vec<Option<Database>>>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: keys removed by DEL
    del_count: AtomicU64,

    /// Statistics: keys evicted on expiry, lazily or by the reaper
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("db_path", &self.config.db_path)
            .field("open_databases", &self.open_databases())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl StorageEngine {
    /// Creates the engine and opens database 0.
    ///
    /// Failing to open database 0 is fatal: the server must not start.
    pub fn open(config: Config) -> Result<Self> {
        let engine = Self {
            config,
            databases: Mutex::new((0..NUM_DATABASES).map(|_| None).collect()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        };
        engine.open_database(0)?;
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<Database>>> {
        self.databases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the database in `slots[db]`, opening it if it is cold.
    fn ensure_open<'a>(
        config: &Config,
        slots: &'a mut [Option<Database>],
        db: usize,
    ) -> Result<&'a mut Database> {
        let slot = slots.get_mut(db).ok_or_else(|| {
            Error::validation(format!(
                "DB index is out of range (0-{})",
                NUM_DATABASES - 1
            ))
        })?;

        if slot.is_none() {
            let database = Database::open(config, db).map_err(|e| {
                warn!(db = db, error = %e, "Failed to open database");
                Error::DatabaseOpen {
                    db,
                    reason: e.to_string(),
                }
            })?;
            info!(db = db, keys = database.entries.len(), "Database opened");
            *slot = Some(database);
        }

        slot.as_mut().ok_or_else(|| Error::DatabaseOpen {
            db,
            reason: "database slot empty after open".to_string(),
        })
    }

    /// Runs `f` against database `db` under the global lock.
    fn with_db<T>(&self, db: usize, f: impl FnOnce(&mut Database, i64) -> Result<T>) -> Result<T> {
        let mut slots = self.lock();
        let database = Self::ensure_open(&self.config, &mut slots, db)?;
        f(database, unix_now())
    }

    /// Opens database `db` if it is not open yet. Used by SELECT.
    pub fn open_database(&self, db: usize) -> Result<()> {
        self.with_db(db, |_, _| Ok(()))
    }

    /// Ids of every database opened so far.
    pub fn open_databases(&self) -> Vec<usize> {
        self.lock()
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
            .collect()
    }

    fn record_eviction(&self, observed_evicted: bool) {
        if observed_evicted {
            self.expired_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Looks up `key`, evicting it if expired. Reports whether an eviction
    /// happened alongside the value.
    pub fn observe(&self, db: usize, key: &str) -> Result<Observed<Entry>> {
        let observed = self.with_db(db, |database, now| {
            Ok(database.observe(key, now)?.map(Entry::clone))
        })?;
        self.record_eviction(observed.evicted);
        Ok(observed)
    }

    /// Returns the live entry for `key`.
    pub fn get_entry(&self, db: usize, key: &str) -> Result<Option<Entry>> {
        Ok(self.observe(db, key)?.value)
    }

    /// Returns the value of `key`, or None if missing or expired.
    pub fn get(&self, db: usize, key: &str) -> Result<Option<String>> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.get_entry(db, key)?.map(|entry| entry.value))
    }

    pub fn exists(&self, db: usize, key: &str) -> Result<bool> {
        Ok(self.get_entry(db, key)?.is_some())
    }

    pub fn type_of(&self, db: usize, key: &str) -> Result<Option<ValueType>> {
        Ok(self.get_entry(db, key)?.map(|entry| entry.value_type))
    }

    pub fn ttl(&self, db: usize, key: &str) -> Result<Ttl> {
        let now = unix_now();
        Ok(match self.get_entry(db, key)? {
            None => Ttl::Missing,
            Some(entry) => match entry.ttl_at(now) {
                None => Ttl::Persistent,
                Some(secs) => Ttl::Expires(secs),
            },
        })
    }

    /// Returns every live key matching `pattern`, in no particular order.
    ///
    /// Expired entries met while scanning are evicted.
    pub fn keys(&self, db: usize, pattern: &str) -> Result<Vec<String>> {
        let pattern = GlobPattern::new(pattern);

        let (keys, evicted) = self.with_db(db, |database, now| {
            let expired = database.expired_keys(now);
            for key in &expired {
                database.evict(key)?;
            }

            let keys = database
                .entries
                .keys()
                .filter(|key| pattern.matches(key))
                .cloned()
                .collect::<Vec<_>>();
            Ok((keys, expired.len() as u64))
        })?;

        self.expired_count.fetch_add(evicted, Ordering::Relaxed);
        Ok(keys)
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// `ttl` is a relative lifetime in seconds and must be positive.
    /// The journal record, the in-memory entry and the snapshot are all
    /// written while the lock is held. An expired predecessor is evicted
    /// first, so the new key gets a fresh `created_at`.
    pub fn set(&self, db: usize, key: &str, value: &str, ttl: Option<u64>) -> Result<Entry> {
        if ttl == Some(0) {
            return Err(Error::validation("invalid expire time"));
        }
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut evicted = false;
        let result = self.with_db(db, |database, now| {
            evicted = database.observe(key, now)?.evicted;

            let entry = match ttl {
                Some(secs) => Entry::with_expire_at(value, expire_at_after(now, secs)),
                None => Entry::new(value),
            };

            database.aof.append_set(key, value, entry.expire_at)?;
            database.entries.insert(key.to_string(), entry.clone());
            database.save_snapshot(key, now)?;

            debug!(db = database.id, key = %key, value_type = %entry.value_type, "SET");
            Ok(entry)
        });

        self.record_eviction(evicted);
        result
    }

    /// Deletes each key that is present. Returns how many were removed.
    ///
    /// Absent keys are skipped; expired keys are evicted but not counted.
    pub fn delete(&self, db: usize, keys: &[String]) -> Result<u64> {
        let mut evicted = 0;
        let result = self.with_db(db, |database, now| {
            let mut deleted = 0u64;
            for key in keys {
                let expired = match database.entries.get(key.as_str()) {
                    None => continue,
                    Some(entry) => entry.is_expired_at(now),
                };
                if expired {
                    database.evict(key)?;
                    evicted += 1;
                    continue;
                }

                database.aof.append_del(key)?;
                database.entries.remove(key.as_str());
                deleted += 1;

                if let Err(e) = database.snapshots.delete(key) {
                    warn!(db = database.id, key = %key, error = %e, "Failed to delete snapshot");
                }
            }
            Ok(deleted)
        });

        self.expired_count.fetch_add(evicted, Ordering::Relaxed);
        let deleted = result?;
        self.del_count.fetch_add(deleted, Ordering::Relaxed);
        Ok(deleted)
    }

    /// Sets `key` to expire `ttl` seconds from now.
    ///
    /// Returns false if the key is missing or already expired (in which case
    /// it is evicted first).
    pub fn expire(&self, db: usize, key: &str, ttl: u64) -> Result<bool> {
        let observed = self.with_db(db, |database, now| {
            let observed = database.observe(key, now)?.map(Entry::clone);
            let Some(entry) = observed.value else {
                return Ok(Observed {
                    value: None,
                    evicted: observed.evicted,
                });
            };

            let expire_at = expire_at_after(now, ttl);
            database.aof.append_set(key, &entry.value, Some(expire_at))?;
            if let Some(entry) = database.entries.get_mut(key) {
                entry.expire_at = Some(expire_at);
            }
            database.save_snapshot(key, now)?;

            debug!(db = database.id, key = %key, expire_at = expire_at, "EXPIRE");
            Ok(Observed::live(true))
        })?;

        self.record_eviction(observed.evicted);
        Ok(observed.value.unwrap_or(false))
    }

    /// Clears the expiry of `key`.
    ///
    /// Returns false if the key is missing, already expired, or has no TTL.
    pub fn persist(&self, db: usize, key: &str) -> Result<bool> {
        let observed = self.with_db(db, |database, now| {
            let observed = database.observe(key, now)?.map(Entry::clone);
            let Some(entry) = observed.value else {
                return Ok(Observed {
                    value: None,
                    evicted: observed.evicted,
                });
            };
            if entry.expire_at.is_none() {
                return Ok(Observed::live(false));
            }

            database.aof.append_set(key, &entry.value, None)?;
            if let Some(entry) = database.entries.get_mut(key) {
                entry.expire_at = None;
            }
            database.save_snapshot(key, now)?;

            debug!(db = database.id, key = %key, "PERSIST");
            Ok(Observed::live(true))
        })?;

        self.record_eviction(observed.evicted);
        Ok(observed.value.unwrap_or(false))
    }

    /// Evicts every expired entry in every open database.
    ///
    /// A failed eviction is logged and the sweep moves on.
    pub fn cleanup_expired(&self) -> SweepReport {
        let now = unix_now();
        let mut report = SweepReport::default();
        let mut slots = self.lock();

        for database in slots.iter_mut().flatten() {
            let mut count = 0u64;
            for key in database.expired_keys(now) {
                match database.evict(&key) {
                    Ok(()) => count += 1,
                    Err(e) => {
                        warn!(db = database.id, key = %key, error = %e, "Failed to evict expired key")
                    }
                }
            }
            if count > 0 {
                report.per_db.push((database.id, count));
                report.total += count;
            }
        }

        self.expired_count.fetch_add(report.total, Ordering::Relaxed);
        report
    }

    /// Syncs every open journal to disk. Call after stopping the reaper.
    pub fn sync_all(&self) -> Result<()> {
        let slots = self.lock();
        for database in slots.iter().flatten() {
            database.aof.sync()?;
            info!(db = database.id, path = %database.aof.path().display(), "AOF file synced");
        }
        Ok(())
    }

    /// Returns engine statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            open_databases: self.open_databases().len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired_keys: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub open_databases: usize,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub expired_keys: u64,
}
