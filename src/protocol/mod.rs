//! Text Protocol
//!
//! Clients talk to JsonDB one line at a time:
//!
//! ```text
//! client: SET user:1 {"name":"ada"} 3600
//! server: OK
//! client: TYPE user:1
//! server: object
//! ```
//!
//! ## Modules
//!
//! - `command`: the typed [`Command`] union
//! - `parser`: turns an input line into a `Command`
//! - `reply`: the [`Reply`] shapes and their text rendering

pub mod command;
pub mod parser;
pub mod reply;

pub use command::Command;
pub use parser::{parse_command, ParseError, ParseResult};
pub use reply::Reply;
