//! RESP Protocol Implementation
//!
//! The wire format spoken between the gateway and the upstream store.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum, command encoding and serialization
//! - `parser`: incremental parser for replies read off a socket
//!
//! ## Example
//!
//! ```
//! use flashgate::protocol::{parse_message, RespValue};
//!
//! // Encoding a command
//! let bytes = RespValue::command(["TYPE", "user:101"]).serialize();
//! assert!(bytes.starts_with(b"*2\r\n"));
//!
//! // Decoding the reply
//! let (reply, _) = parse_message(b"+hash\r\n").unwrap().unwrap();
//! assert_eq!(reply.as_str(), Some("hash"));
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
