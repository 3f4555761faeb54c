//! Typed commands.
//!
//! Each variant carries exactly the arguments its verb needs, already
//! validated by the parser. Time arguments have been resolved to a relative
//! number of seconds.

use std::fmt;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SELECT n`
    Select { db: usize },

    /// `GET k`
    Get { key: String },

    /// `SET k v [ttl|timestamp]`
    Set {
        key: String,
        value: String,
        /// Seconds from now; always positive when present
        ttl: Option<u64>,
    },

    /// `DEL k [k ...]`
    Del { keys: Vec<String> },

    /// `EXISTS k`
    Exists { key: String },

    /// `KEYS pattern`
    Keys { pattern: String },

    /// `TYPE k`
    Type { key: String },

    /// `TTL k [filters]`
    Ttl { key: String, filters: Option<String> },

    /// `EXPIRE k ttl|timestamp [filters]`
    Expire {
        key: String,
        ttl: u64,
        filters: Option<String>,
    },

    /// `PERSIST k [filters]`
    Persist { key: String, filters: Option<String> },

    /// `FIND k [filters]`
    Find { key: String, filters: Option<String> },

    /// `ADD k v`
    Add { key: String, value: String },

    Ping,
    Help,
}

impl Command {
    /// The verb, upper-cased.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Select { .. } => "SELECT",
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Keys { .. } => "KEYS",
            Command::Type { .. } => "TYPE",
            Command::Ttl { .. } => "TTL",
            Command::Expire { .. } => "EXPIRE",
            Command::Persist { .. } => "PERSIST",
            Command::Find { .. } => "FIND",
            Command::Add { .. } => "ADD",
            Command::Ping => "PING",
            Command::Help => "HELP",
        }
    }

    /// True for commands that append to the journal when they succeed.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Set { .. } | Command::Del { .. } | Command::Expire { .. } | Command::Persist { .. }
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_write_flag() {
        let set = Command::Set {
            key: "k".into(),
            value: "v".into(),
            ttl: None,
        };
        assert_eq!(set.name(), "SET");
        assert!(set.is_write());

        let get = Command::Get { key: "k".into() };
        assert_eq!(get.to_string(), "GET");
        assert!(!get.is_write());

        // FIND/ADD never touch the store
        assert!(!Command::Add {
            key: "k".into(),
            value: "v".into()
        }
        .is_write());
    }
}
