//! # JsonDB - A Persistent JSON Key-Value Database
//!
//! JsonDB is a small key-value server that stores JSON-aware string values
//! in sixteen independent databases. Every write is journaled to an
//! append-only file before it is acknowledged, and each key is also mirrored
//! to its own JSON snapshot file for inspection.
//!
//! ## Features
//!
//! - **Durable**: One AOF journal per database, synced on every append and
//!   replayed when the database is first used
//! - **Typed values**: Values are classified as `int`, `object`, `array` or
//!   `string` when written
//! - **TTL Support**: Relative or absolute expiry, evicted lazily on read and
//!   by a background reaper
//! - **Async I/O**: Built on Tokio, one task per client session
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              JsonDB                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Text      │    │              StorageEngine                   │    │
//! │  │   Parser    │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  │             │    │  │ db 0   │ │ db 1   │ │ db 2   │ │...15   │ │    │
//! │  └─────────────┘    │  │AOF+json│ │AOF+json│ │AOF+json│ │        │ │    │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │                     └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │                 Reaper                          │ │
//! │                     │          (Background Tokio Task)                │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use jsondb::commands::CommandHandler;
//! use jsondb::config::Config;
//! use jsondb::connection::{handle_connection, ConnectionStats};
//! use jsondb::storage::{Reaper, ReaperConfig, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::open(Config::new("./data"))?);
//!     let _reaper = Reaper::start(Arc::clone(&storage), ReaperConfig::default());
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:7989").await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SELECT n`
//! - `GET k`, `SET k v [ttl|timestamp]`, `DEL k [k ...]`, `EXISTS k`
//! - `KEYS pattern`, `TYPE k`
//! - `TTL k`, `EXPIRE k ttl|timestamp`, `PERSIST k`
//! - `FIND k [filters]`, `ADD k v` (placeholders)
//! - `PING`, `HELP`, `QUIT`/`BYE`/`EXIT`
//!
//! ## Module Overview
//!
//! - [`protocol`]: command parser, typed commands and reply rendering
//! - [`storage`]: databases, journal, snapshots and the TTL reaper
//! - [`commands`]: per-session command execution
//! - [`connection`]: client session loop
//!
//! ## Known Limitations
//!
//! The journal is never compacted. A database that sees many overwrites
//! keeps every one of them on disk and replays them all at open.

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod storage;

pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use error::{Error, Result};
pub use protocol::{parse_command, Command, ParseError, Reply};
pub use storage::{Reaper, ReaperConfig, StorageEngine};

/// The default port JsonDB listens on
pub const DEFAULT_PORT: u16 = 7989;

/// The default host JsonDB binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Number of databases (ids 0 through 15)
pub const NUM_DATABASES: usize = 16;

/// Version of JsonDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
