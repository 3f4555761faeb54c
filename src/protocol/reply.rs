//! Reply rendering.
//!
//! Every command result is one of five shapes, rendered as a single line of
//! text:
//!
//! ```text
//! Nil          (nil)
//! Integer      (integer) 3
//! Bulk         hello
//! List         [a b c]      or (empty)
//! Error        Error: usage: GET <key>
//! ```

use std::fmt;

/// The result of executing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// No value
    Nil,

    /// A count, flag or TTL
    Integer(i64),

    /// Raw text, written as-is
    Bulk(String),

    /// A list of keys
    List(Vec<String>),

    /// A failed command. The connection stays open.
    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Bulk("OK".to_string())
    }

    pub fn bulk(s: impl Into<String>) -> Self {
        Reply::Bulk(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// `(integer) 1` for true, `(integer) 0` for false.
    pub fn flag(b: bool) -> Self {
        Reply::Integer(i64::from(b))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Nil => f.write_str("(nil)"),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(s) => f.write_str(s),
            Reply::List(items) if items.is_empty() => f.write_str("(empty)"),
            Reply::List(items) => write!(f, "[{}]", items.join(" ")),
            Reply::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl From<crate::Error> for Reply {
    fn from(e: crate::Error) -> Self {
        Reply::Error(e.to_string())
    }
}
