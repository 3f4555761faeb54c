//! Storage Module
//!
//! Everything below the command layer: the entry model, the per-database
//! journal and snapshot files, the engine that ties them together and the
//! background TTL reaper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌──────────┐ ┌──────────┐            ┌──────────┐          │
//! │  │   db 0   │ │   db 1   │    ...     │  db 15   │          │
//! │  │ HashMap  │ │ (cold)   │            │ (cold)   │          │
//! │  │ AOF      │ │          │            │          │          │
//! │  │ snapshots│ │          │            │          │          │
//! │  └──────────┘ └──────────┘            └──────────┘          │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!              ┌─────────────┴─────────────┐
//!              │         Reaper            │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## On disk
//!
//! ```text
//! <db_path>/aof/db_<N>.aof                       journal, replayed at open
//! <db_path>/<N>/<h0h1>/<h2h3>/<h4h5>/<hash>.json  per-key snapshot
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use jsondb::config::Config;
//! use jsondb::storage::{StorageEngine, Ttl};
//!
//! let engine = StorageEngine::open(Config::new("./data")).unwrap();
//!
//! engine.set(0, "session", "token123", Some(3600)).unwrap();
//! assert!(matches!(engine.ttl(0, "session").unwrap(), Ttl::Expires(_)));
//! ```

pub mod aof;
pub mod engine;
pub mod entry;
pub mod expiry;
pub mod glob;
pub mod snapshot;

pub use aof::{AofCommand, AofRecord, AofWriter};
pub use engine::{Observed, StorageEngine, StorageStats, SweepReport, Ttl};
pub use entry::{Entry, ValueType};
pub use expiry::{Reaper, ReaperConfig};
pub use glob::{glob_match, GlobPattern};
pub use snapshot::{Cache, SnapshotStore};
