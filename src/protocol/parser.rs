//! Incremental RESP Parser
//!
//! Store replies arrive over TCP in arbitrary chunks. The parser looks at the
//! bytes buffered so far and returns:
//! - `Ok(Some((value, consumed)))` - a complete value; advance the buffer by `consumed`
//! - `Ok(None)` - the value is incomplete, read more from the socket
//! - `Err(ParseError)` - the peer is not speaking RESP; the connection is unusable
//!
//! Unlike a server-side parser there is no inline-command fallback: a store
//! only ever answers with typed values, so an unknown prefix byte is an error.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Negative length other than the `-1` null marker
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// A resumable RESP parser.
///
/// ```
/// use flashgate::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// assert!(parser.parse(b"$5\r\nhel").unwrap().is_none());
///
/// let (value, used) = parser.parse(b"$5\r\nhello\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::bulk_string("hello"));
/// assert_eq!(used, 11);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match first {
            prefix::SIMPLE_STRING => Ok(read_line(buf)?
                .map(|(line, used)| (RespValue::SimpleString(line.to_string()), used))),
            prefix::ERROR => {
                Ok(read_line(buf)?.map(|(line, used)| (RespValue::Error(line.to_string()), used)))
            }
            prefix::INTEGER => match read_line(buf)? {
                Some((line, used)) => Ok(Some((RespValue::Integer(parse_int(line)?), used))),
                None => Ok(None),
            },
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// `$<length>\r\n<data>\r\n`, or `$-1\r\n` for null
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some((header, header_len)) = read_line(buf)? else {
            return Ok(None);
        };

        let length = parse_int(header)?;
        if length == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total = header_len + length + CRLF.len();
        if buf.len() < total {
            return Ok(None);
        }
        if &buf[header_len + length..total] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
        Ok(Some((RespValue::BulkString(data), total)))
    }

    /// `*<count>\r\n<elements...>`, or `*-1\r\n` for null
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some((header, mut consumed)) = read_line(buf)? else {
            return Ok(None);
        };

        let count = parse_int(header)?;
        if count == -1 {
            return Ok(Some((RespValue::Null, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        // The count comes off the wire; don't let it drive a huge allocation.
        let mut elements = Vec::with_capacity((count as usize).min(1024));

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, used)) => {
                    elements.push(value);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Reads the line following the prefix byte. Returns the line text and the
/// number of bytes consumed including prefix and CRLF.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let line = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((line, 1 + pos + CRLF.len())))
        }
        None => Ok(None),
    }
}

fn parse_int(s: &str) -> ParseResult<i64> {
    s.parse()
        .map_err(|e: std::num::ParseIntError| ParseError::InvalidInteger(format!("{s:?}: {e}")))
}

/// Position of the `\r` of the first CRLF in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single value with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
