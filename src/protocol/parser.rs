//! Text Command Parser
//!
//! Turns one line of client input into a [`Command`]. Tokens are separated
//! by whitespace and the verb is case-insensitive; keys and values are kept
//! exactly as typed.
//!
//! ## Time arguments
//!
//! `SET` and `EXPIRE` take either a number of seconds from now or an
//! absolute local time in one of these forms:
//!
//! ```text
//! 2030-01-02 03:04:05
//! 2030-01-02 03:04
//! 2030-01-02 03
//! 2030-01-02
//! 2030-01
//! ```
//!
//! Absolute times are converted to remaining seconds at parse time. A time
//! already in the past resolves to zero.

use crate::protocol::command::Command;
use crate::{Error, NUM_DATABASES};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use thiserror::Error;

/// Errors that can occur while parsing a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Blank input
    #[error("no command")]
    Empty,

    /// The verb is not one we know
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Wrong number of arguments; carries the usage line
    #[error("usage: {0}")]
    Usage(&'static str),

    /// SELECT argument is not an integer
    #[error("invalid database number: {0}")]
    InvalidDatabase(String),

    /// SELECT argument is outside 0..NUM_DATABASES
    #[error("database must be between 0 and {}", NUM_DATABASES - 1)]
    DatabaseOutOfRange,

    /// Time argument is neither seconds nor a recognised timestamp
    #[error("invalid expire time: {0}")]
    InvalidExpireTime(String),
}

impl ParseError {
    /// True for unparsable input; false for a known verb with bad arguments.
    pub fn is_protocol(&self) -> bool {
        matches!(self, ParseError::Empty | ParseError::UnknownCommand(_))
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        if e.is_protocol() {
            Error::Protocol(e.to_string())
        } else {
            Error::Validation(e.to_string())
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parses one line of input.
///
/// # Example
///
/// ```
/// use jsondb::protocol::{parse_command, Command};
///
/// let cmd = parse_command("get name").unwrap();
/// assert_eq!(cmd, Command::Get { key: "name".to_string() });
/// ```
pub fn parse_command(line: &str) -> ParseResult<Command> {
    parse_command_at(line, Local::now())
}

/// Parses one line, resolving absolute times against `now`.
pub fn parse_command_at(line: &str, now: DateTime<Local>) -> ParseResult<Command> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(verb) = parts.first() else {
        return Err(ParseError::Empty);
    };
    let verb = verb.to_ascii_uppercase();

    match verb.as_str() {
        "SELECT" => parse_select(&parts),
        "GET" => single_key(&parts, "GET <key>").map(|key| Command::Get { key }),
        "SET" => parse_set(&parts, now),
        "DEL" => parse_del(&parts),
        "EXISTS" => single_key(&parts, "EXISTS <key>").map(|key| Command::Exists { key }),
        "KEYS" => single_key(&parts, "KEYS <pattern>").map(|pattern| Command::Keys { pattern }),
        "TYPE" => single_key(&parts, "TYPE <key>").map(|key| Command::Type { key }),
        "FIND" => {
            let key = leading_key(&parts, "FIND <key> [filters]")?;
            Ok(Command::Find {
                key,
                filters: join(&parts[2..]),
            })
        }
        "ADD" => parse_add(&parts),
        "TTL" => {
            let key = leading_key(&parts, "TTL <key> [filters]")?;
            Ok(Command::Ttl {
                key,
                filters: join(&parts[2..]),
            })
        }
        "EXPIRE" => parse_expire(&parts, now),
        "PERSIST" => {
            let key = leading_key(&parts, "PERSIST <key> [filters]")?;
            Ok(Command::Persist {
                key,
                filters: join(&parts[2..]),
            })
        }
        "PING" => Ok(Command::Ping),
        "HELP" => Ok(Command::Help),
        _ => Err(ParseError::UnknownCommand(verb)),
    }
}

/// Exactly one argument.
fn single_key(parts: &[&str], usage: &'static str) -> ParseResult<String> {
    match parts {
        [_, key] => Ok(key.to_string()),
        _ => Err(ParseError::Usage(usage)),
    }
}

/// At least one argument; the rest are left to the caller.
fn leading_key(parts: &[&str], usage: &'static str) -> ParseResult<String> {
    parts
        .get(1)
        .map(|key| key.to_string())
        .ok_or(ParseError::Usage(usage))
}

fn join(tokens: &[&str]) -> Option<String> {
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn parse_select(parts: &[&str]) -> ParseResult<Command> {
    let [_, raw] = parts else {
        return Err(ParseError::Usage("SELECT <db:int>"));
    };

    let db: i64 = raw
        .parse()
        .map_err(|_| ParseError::InvalidDatabase(raw.to_string()))?;
    if !(0..NUM_DATABASES as i64).contains(&db) {
        return Err(ParseError::DatabaseOutOfRange);
    }

    Ok(Command::Select { db: db as usize })
}

fn parse_set(parts: &[&str], now: DateTime<Local>) -> ParseResult<Command> {
    const USAGE: &str = "SET <key> <value> [ttl_second|expire_time]";

    if !(3..=5).contains(&parts.len()) {
        return Err(ParseError::Usage(USAGE));
    }

    let ttl = match &parts[3..] {
        [] => None,
        // a date and a time of day arrive as two tokens
        time => {
            let raw = time.join(" ");
            let ttl = parse_ttl(&raw, now).ok_or_else(|| ParseError::InvalidExpireTime(raw.clone()))?;
            if ttl == 0 {
                return Err(ParseError::InvalidExpireTime(raw));
            }
            Some(ttl)
        }
    };

    Ok(Command::Set {
        key: parts[1].to_string(),
        value: parts[2].to_string(),
        ttl,
    })
}

fn parse_del(parts: &[&str]) -> ParseResult<Command> {
    if parts.len() < 2 {
        return Err(ParseError::Usage("DEL <key1> [key2] ..."));
    }
    Ok(Command::Del {
        keys: parts[1..].iter().map(|k| k.to_string()).collect(),
    })
}

fn parse_add(parts: &[&str]) -> ParseResult<Command> {
    match parts {
        [_, key, value] => Ok(Command::Add {
            key: key.to_string(),
            value: value.to_string(),
        }),
        _ => Err(ParseError::Usage("ADD <key> <value>")),
    }
}

fn parse_expire(parts: &[&str], now: DateTime<Local>) -> ParseResult<Command> {
    if parts.len() < 3 {
        return Err(ParseError::Usage(
            "EXPIRE <key> <ttl_second|expire_time> [filters]",
        ));
    }

    // prefer "<date> <time>" over "<date>" followed by a filter token
    let joined = parts
        .get(3)
        .map(|time| format!("{} {}", parts[2], time))
        .and_then(|raw| parse_timestamp(&raw, now));

    let (ttl, rest) = match joined {
        Some(ttl) => (ttl, &parts[4..]),
        None => {
            let ttl = parse_ttl(parts[2], now)
                .ok_or_else(|| ParseError::InvalidExpireTime(parts[2].to_string()))?;
            (ttl, &parts[3..])
        }
    };

    Ok(Command::Expire {
        key: parts[1].to_string(),
        ttl,
        filters: join(rest),
    })
}

/// Resolves a time argument to seconds from `now`.
///
/// Timestamps are tried before plain integers.
pub fn parse_ttl(value: &str, now: DateTime<Local>) -> Option<u64> {
    parse_timestamp(value, now).or_else(|| value.parse::<u64>().ok())
}

/// Parses an absolute local time and returns the whole seconds until it,
/// clamped to zero.
fn parse_timestamp(value: &str, now: DateTime<Local>) -> Option<u64> {
    let naive = parse_local(value)?;
    let at = Local.from_local_datetime(&naive).earliest()?;
    Some((at - now).num_seconds().max(0) as u64)
}

fn parse_local(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M") {
        return Some(dt);
    }
    // chrono wants minutes whenever hours are present
    if value.len() == 13 && value.as_bytes().get(10) == Some(&b' ') {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&format!("{}:00", value), "%Y-%m-%d %H:%M") {
            return Some(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}
