//! Command Handler
//!
//! Executes parsed [`Command`]s against the shared [`StorageEngine`] on
//! behalf of one session, and turns every result into a [`Reply`].
//!
//! ## Supported Commands
//!
//! ### KV Commands
//! - `GET key` - Get a key's value
//! - `SET key value [ttl|timestamp]` - Set a key, optionally expiring
//! - `DEL key [key ...]` - Delete keys
//! - `EXISTS key` - Check if a key exists
//! - `KEYS pattern` - Find keys by glob pattern
//! - `TYPE key` - Value type (`int`, `string`, `object`, `array` or `none`)
//!
//! ### TTL Commands
//! - `TTL key` - Remaining seconds, -1 without expiry, -2 if missing
//! - `EXPIRE key ttl|timestamp` - Set expiry
//! - `PERSIST key` - Remove expiry
//!
//! ### Document Commands
//! - `FIND key [filters]`, `ADD key value` - Accepted, not implemented yet
//!
//! ### Server Commands
//! - `SELECT db` - Switch database (0-15)
//! - `PING` - Test connection
//! - `HELP` - Command summary
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │   parse()   │───>│  dispatch() │───>│   Reply     │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                            │                                │
//! │                            ▼                                │
//! │                   StorageEngine (db = selected)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::{parse_command, Command, Reply};
use crate::storage::StorageEngine;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, warn};

const HELP_TEXT: &str = "\
JsonDB Commands:

KV operations:
  GET <key>                    - Get value by key
  SET <key> <value> [ttl]      - Set key-value pair with optional TTL
  DEL <key1> [key2] ...        - Delete one or more keys
  EXISTS <key>                 - Check if key exists
  KEYS <pattern>               - Find keys matching pattern
  TYPE <key>                   - Get value type of key

DOC operations:
  FIND <key> [filters]         - Query documents with filters
  ADD <key> <value>            - Add document to collection

TTL operations:
  TTL <key> [filters]          - Get remaining TTL
  EXPIRE <key> <seconds>       - Set key expiration
  PERSIST <key>                - Remove key expiration

Database:
  SELECT <db_number>           - Select database (0-15)

Utility:
  PING                         - Test connection
  HELP                         - Show this help
  QUIT/EXIT                    - Close connection

Note: Advanced features are currently in progress.";

/// Executes commands for one session.
///
/// Each session owns its handler; the selected database is never shared.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Database this session is working in
    db: usize,
}

impl CommandHandler {
    /// Creates a handler with database 0 selected.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage, db: 0 }
    }

    pub fn selected_db(&self) -> usize {
        self.db
    }

    /// Parses and executes one input line.
    pub fn execute_line(&mut self, line: &str) -> Reply {
        match parse_command(line) {
            Ok(command) => self.execute(command),
            Err(e) => {
                debug!(line = %line, error = %e, "Rejected command");
                Reply::error(e.to_string())
            }
        }
    }

    /// Executes a command and returns the reply.
    pub fn execute(&mut self, command: Command) -> Reply {
        let name = command.name();
        let write = command.is_write();
        match self.dispatch(command) {
            Ok(reply) => {
                if write {
                    debug!(db = self.db, command = name, "Write applied");
                }
                reply
            }
            Err(e) => {
                if e.is_storage() {
                    warn!(db = self.db, command = name, error = %e, "Command failed");
                } else {
                    debug!(db = self.db, command = name, error = %e, "Command rejected");
                }
                Reply::from(e)
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<Reply> {
        match command {
            Command::Select { db } => self.cmd_select(db),
            Command::Get { key } => self.cmd_get(&key),
            Command::Set { key, value, ttl } => self.cmd_set(&key, &value, ttl),
            Command::Del { keys } => self.cmd_del(&keys),
            Command::Exists { key } => self.cmd_exists(&key),
            Command::Keys { pattern } => self.cmd_keys(&pattern),
            Command::Type { key } => self.cmd_type(&key),
            Command::Ttl { key, .. } => self.cmd_ttl(&key),
            Command::Expire { key, ttl, .. } => self.cmd_expire(&key, ttl),
            Command::Persist { key, .. } => self.cmd_persist(&key),
            Command::Find { key, filters } => Ok(Reply::bulk(format!(
                "FIND operation in progress for key: {} with filters: {}",
                key,
                filters.unwrap_or_default()
            ))),
            Command::Add { key, value } => Ok(Reply::bulk(format!(
                "ADD operation in progress for key: {}, value: {}",
                key, value
            ))),
            Command::Ping => Ok(Reply::bulk("PONG")),
            Command::Help => Ok(Reply::bulk(HELP_TEXT)),
        }
    }

    // ========================================================================
    // KV Commands
    // ========================================================================

    /// SELECT db
    ///
    /// Opens the database on first use; the selection only changes if that
    /// succeeds.
    fn cmd_select(&mut self, db: usize) -> Result<Reply> {
        self.storage.open_database(db)?;
        self.db = db;
        Ok(Reply::ok())
    }

    /// GET key
    fn cmd_get(&self, key: &str) -> Result<Reply> {
        Ok(match self.storage.get(self.db, key)? {
            Some(value) => Reply::Bulk(value),
            None => Reply::Nil,
        })
    }

    /// SET key value [ttl]
    fn cmd_set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<Reply> {
        self.storage.set(self.db, key, value, ttl)?;
        Ok(Reply::ok())
    }

    /// DEL key [key ...]
    fn cmd_del(&self, keys: &[String]) -> Result<Reply> {
        let deleted = self.storage.delete(self.db, keys)?;
        Ok(Reply::Integer(deleted as i64))
    }

    /// EXISTS key
    fn cmd_exists(&self, key: &str) -> Result<Reply> {
        Ok(Reply::flag(self.storage.exists(self.db, key)?))
    }

    /// KEYS pattern
    fn cmd_keys(&self, pattern: &str) -> Result<Reply> {
        let mut keys = self.storage.keys(self.db, pattern)?;
        keys.sort_unstable();
        Ok(Reply::List(keys))
    }

    /// TYPE key
    fn cmd_type(&self, key: &str) -> Result<Reply> {
        Ok(match self.storage.type_of(self.db, key)? {
            Some(value_type) => Reply::bulk(value_type.as_str()),
            None => Reply::bulk("none"),
        })
    }

    // ========================================================================
    // TTL Commands
    // ========================================================================

    /// TTL key
    fn cmd_ttl(&self, key: &str) -> Result<Reply> {
        Ok(Reply::Integer(self.storage.ttl(self.db, key)?.as_code()))
    }

    /// EXPIRE key ttl
    fn cmd_expire(&self, key: &str, ttl: u64) -> Result<Reply> {
        Ok(Reply::flag(self.storage.expire(self.db, key, ttl)?))
    }

    /// PERSIST key
    fn cmd_persist(&self, key: &str) -> Result<Reply> {
        Ok(Reply::flag(self.storage.persist(self.db, key)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_handler() -> (TempDir, CommandHandler) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageEngine::open(Config::new(dir.path())).unwrap());
        (dir, CommandHandler::new(storage))
    }

    fn run(handler: &mut CommandHandler, line: &str) -> String {
        handler.execute_line(line).to_string()
    }

    #[test]
    fn test_ping() {
        let (_dir, mut handler) = create_handler();
        assert_eq!(handler.execute(Command::Ping), Reply::bulk("PONG"));
        assert_eq!(run(&mut handler, "ping"), "PONG");
    }

    #[test]
    fn test_set_get_type() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(run(&mut handler, "SET foo 123"), "OK");
        assert_eq!(run(&mut handler, "GET foo"), "123");
        assert_eq!(run(&mut handler, "TYPE foo"), "int");

        assert_eq!(run(&mut handler, r#"SET bar {"a":1}"#), "OK");
        assert_eq!(run(&mut handler, "TYPE bar"), "object");
        assert_eq!(run(&mut handler, "GET bar"), r#"{"a":1}"#);

        assert_eq!(run(&mut handler, "SET list [1,2]"), "OK");
        assert_eq!(run(&mut handler, "TYPE list"), "array");
    }

    #[test]
    fn test_get_nonexistent() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(handler.execute_line("GET nonexistent"), Reply::Nil);
        assert_eq!(run(&mut handler, "TYPE nonexistent"), "none");
        assert_eq!(run(&mut handler, "EXISTS nonexistent"), "(integer) 0");
    }

    #[test]
    fn test_out_of_range_ttl_never_expires_early() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(run(&mut handler, "SET big v 18446744073709551615"), "OK");
        assert_eq!(run(&mut handler, "GET big"), "v");

        assert_eq!(run(&mut handler, "SET e v"), "OK");
        assert_eq!(run(&mut handler, "EXPIRE e 9223372036854775808"), "(integer) 1");
        assert_eq!(run(&mut handler, "GET e"), "v");
        assert_eq!(run(&mut handler, "EXISTS e"), "(integer) 1");
    }

    #[test]
    fn test_del() {
        let (_dir, mut handler) = create_handler();

        run(&mut handler, "SET k1 v1");
        assert_eq!(run(&mut handler, "DEL k1 k2"), "(integer) 1");
        assert_eq!(run(&mut handler, "DEL k1"), "(integer) 0");
        assert_eq!(run(&mut handler, "EXISTS k1"), "(integer) 0");
    }

    #[test]
    fn test_keys() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(run(&mut handler, "KEYS *"), "(empty)");
        run(&mut handler, "SET b 1");
        run(&mut handler, "SET a 1");
        run(&mut handler, "SET abc 1");

        assert_eq!(run(&mut handler, "KEYS *"), "[a abc b]");
        assert_eq!(run(&mut handler, "KEYS a*"), "[a abc]");
        assert_eq!(run(&mut handler, "KEYS ?"), "[a b]");
    }

    #[test]
    fn test_ttl_expire_persist() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(run(&mut handler, "TTL missing"), "(integer) -2");
        assert_eq!(run(&mut handler, "EXPIRE missing 5"), "(integer) 0");
        assert_eq!(run(&mut handler, "PERSIST missing"), "(integer) 0");

        run(&mut handler, "SET k v");
        assert_eq!(run(&mut handler, "TTL k"), "(integer) -1");
        assert_eq!(run(&mut handler, "PERSIST k"), "(integer) 0");

        assert_eq!(run(&mut handler, "EXPIRE k 5"), "(integer) 1");
        let Reply::Integer(ttl) = handler.execute_line("TTL k extra filters") else {
            panic!("expected integer reply");
        };
        assert!((0..=5).contains(&ttl));

        assert_eq!(run(&mut handler, "PERSIST k"), "(integer) 1");
        assert_eq!(run(&mut handler, "TTL k"), "(integer) -1");
    }

    #[test]
    fn test_persist_survives_former_expiry() {
        let (_dir, mut handler) = create_handler();

        run(&mut handler, "SET k v 1");
        assert_eq!(run(&mut handler, "PERSIST k"), "(integer) 1");
        std::thread::sleep(Duration::from_millis(1500));
        assert_eq!(run(&mut handler, "GET k"), "v");
    }

    #[test]
    fn test_expiry_scenario() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(run(&mut handler, "SET baz hello 2"), "OK");
        assert_eq!(run(&mut handler, "GET baz"), "hello");
        std::thread::sleep(Duration::from_millis(3100));
        assert_eq!(run(&mut handler, "GET baz"), "(nil)");
        assert_eq!(run(&mut handler, "TTL baz"), "(integer) -2");
    }

    #[test]
    fn test_select_isolation() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(run(&mut handler, "SELECT 1"), "OK");
        assert_eq!(handler.selected_db(), 1);
        run(&mut handler, "SET x 1");

        run(&mut handler, "SELECT 0");
        assert_eq!(run(&mut handler, "GET x"), "(nil)");
    }

    #[test]
    fn test_select_out_of_range() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(
            run(&mut handler, "SELECT 16"),
            "Error: database must be between 0 and 15"
        );
        assert_eq!(handler.selected_db(), 0);

        let reply = handler.execute(Command::Select { db: 42 });
        assert!(reply.is_error());
        assert_eq!(handler.selected_db(), 0);
    }

    #[test]
    fn test_find_and_add_do_not_mutate() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(
            run(&mut handler, "FIND users age>30"),
            "FIND operation in progress for key: users with filters: age>30"
        );
        assert_eq!(
            run(&mut handler, "ADD users {}"),
            "ADD operation in progress for key: users, value: {}"
        );
        assert_eq!(run(&mut handler, "EXISTS users"), "(integer) 0");
    }

    #[test]
    fn test_help() {
        let (_dir, mut handler) = create_handler();
        let help = run(&mut handler, "HELP");
        assert!(help.starts_with("JsonDB Commands:"));
        assert!(help.contains("SELECT <db_number>"));
    }

    #[test]
    fn test_errors() {
        let (_dir, mut handler) = create_handler();

        assert_eq!(run(&mut handler, "FLUSHDB"), "Error: unknown command: FLUSHDB");
        assert_eq!(run(&mut handler, "GET"), "Error: usage: GET <key>");
        assert_eq!(
            run(&mut handler, "SET k v later"),
            "Error: invalid expire time: later"
        );
        assert_eq!(run(&mut handler, "EXISTS k"), "(integer) 0");
    }

    #[test]
    fn test_sessions_are_independent() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageEngine::open(Config::new(dir.path())).unwrap());
        let mut first = CommandHandler::new(Arc::clone(&storage));
        let mut second = CommandHandler::new(storage);

        run(&mut first, "SELECT 3");
        run(&mut first, "SET shared yes");

        assert_eq!(second.selected_db(), 0);
        assert_eq!(run(&mut second, "GET shared"), "(nil)");
        run(&mut second, "SELECT 3");
        assert_eq!(run(&mut second, "GET shared"), "yes");
    }
}
