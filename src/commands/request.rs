//! Request descriptors.
//!
//! A data request names its target in the URL path:
//!
//! ```text
//! /{db}[/{key}][/ttl|/type]
//!
//! /0                  list every key in database 0
//! /3/user:101         key "user:101" in database 3
//! /3/a/b/c            key "a/b/c"
//! /3/session/ttl      key "session", ttl modifier
//! ```
//!
//! `db` is one or two decimal digits. Key segments are percent-decoded.

use super::handler::DispatchError;
use crate::store::DbIndex;
use percent_encoding::percent_decode_str;
use std::fmt;

/// The intent derived from the HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Read,
    Create,
    Update,
    Delete,
}

impl Verb {
    /// Maps an HTTP method name. Anything outside GET/POST/PUT/DELETE is `None`.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(Verb::Read),
            "POST" => Some(Verb::Create),
            "PUT" => Some(Verb::Update),
            "DELETE" => Some(Verb::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Read => "read",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Trailing path segment that changes what a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Ttl,
    Type,
}

/// One inbound data request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub db: DbIndex,
    /// Empty means "list all keys".
    pub key: String,
    pub field: Option<String>,
    pub modifier: Option<Modifier>,
}

impl RequestDescriptor {
    pub fn new(db: DbIndex, key: impl Into<String>) -> Self {
        Self {
            db,
            key: key.into(),
            field: None,
            modifier: None,
        }
    }

    pub fn with_field(mut self, field: Option<&str>) -> Self {
        self.field = field.filter(|f| !f.is_empty()).map(str::to_string);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifier = Some(modifier);
        self
    }

    /// Parses a request path (without its query string).
    pub fn from_path(path: &str) -> Result<Self, DispatchError> {
        let malformed = || DispatchError::MalformedRequest(path.to_string());

        let rest = path.strip_prefix('/').ok_or_else(malformed)?;
        let (db_part, key_part) = match rest.split_once('/') {
            Some((db, key)) => (db, key),
            None => (rest, ""),
        };

        if db_part.is_empty() || db_part.len() > 2 || !db_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }
        let db: DbIndex = db_part.parse().map_err(|_| malformed())?;

        let (raw_key, modifier) = split_modifier(key_part);
        let key = percent_decode(raw_key).ok_or_else(malformed)?;

        Ok(Self {
            db,
            key,
            field: None,
            modifier,
        })
    }
}

fn split_modifier(key_part: &str) -> (&str, Option<Modifier>) {
    for (suffix, modifier) in [("/ttl", Modifier::Ttl), ("/type", Modifier::Type)] {
        if let Some(key) = key_part.strip_suffix(suffix) {
            if !key.is_empty() {
                return (key, Some(modifier));
            }
        }
    }
    (key_part, None)
}

/// Decodes `%XX` escapes, leaving malformed ones as they are. Returns `None`
/// when the result is not UTF-8.
fn percent_decode(s: &str) -> Option<String> {
    percent_decode_str(s)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}
