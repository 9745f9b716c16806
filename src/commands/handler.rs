//! Command Dispatcher
//!
//! Turns a (verb, request, parameters) triple into store commands and a
//! [`ResultEnvelope`].
//!
//! ## Flow
//!
//! ```text
//! dispatch(verb, request, params)
//!       │
//!       ▼
//! router.get(request.db) ──> lock the connection for the whole request
//!       │
//!       ├── Read    TYPE key ──> GET | SMEMBERS | ZRANGE | LRANGE | HGET | HGETALL
//!       ├── Create  EXISTS key ──> SET | LPUSH | SADD | ZADD | HSET
//!       ├── Update  EXISTS key ──> [EXPIRE] ──> TYPE key ──> type-specific write
//!       └── Delete  EXISTS key ──> DEL
//!       │
//!       ▼
//! ResultEnvelope { result, error }
//! ```
//!
//! The probe and the command it selects are issued while holding the
//! database's connection lock, so no other request's commands interleave
//! with them on that connection.
//!
//! ## Reply Normalization
//!
//! | Store reply | JSON |
//! |-------------|------|
//! | bulk / status | string (lossy UTF-8) |
//! | integer | number |
//! | null | `null` |
//! | array | array (recursively) |
//! | `HGETALL` pairs | object |

use super::envelope::ResultEnvelope;
use super::params::Params;
use super::request::{Modifier, RequestDescriptor, Verb};
use crate::protocol::RespValue;
use crate::store::{Connection, ConnectionRouter, StoreError};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Everything that can go wrong while serving one data request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Malformed URL: {0}")]
    MalformedRequest(String),

    #[error("No key specified.")]
    MissingKey,

    #[error("Key does not exist.")]
    KeyNotFound,

    #[error("Key already exists.")]
    KeyExists,

    #[error("Key does not exist, cannot update.")]
    UpdateMissingKey,

    #[error("Unknown type for key {key}: {kind}")]
    UnknownType { key: String, kind: String },

    #[error("Invalid key type.")]
    InvalidKeyType,

    #[error("No value provided.")]
    MissingValue,

    /// Hash create without a field.
    #[error("No field name specified.")]
    MissingField,

    /// Hash update without a field.
    #[error("Missing required parameter: field.")]
    MissingUpdateField,

    #[error("Field does not exist.")]
    FieldNotFound,

    #[error("Invalid ranking {0:?}: expected a floating-point number")]
    InvalidRanking(String),

    #[error("Invalid ttl {0:?}: expected an integer")]
    InvalidTtl(String),

    #[error("Invalid offset {0:?}: expected a non-negative integer")]
    InvalidOffset(String),

    /// Several update steps failed.
    #[error("{}", .0.join(" "))]
    Multiple(Vec<String>),

    #[error("Method {0} is not allowed.")]
    MethodNotAllowed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The value types a store key can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    String,
    List,
    Set,
    ZSet,
    Hash,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::ZSet => "zset",
            KeyType::Hash => "hash",
        }
    }
}

impl FromStr for KeyType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(KeyType::String),
            "list" => Ok(KeyType::List),
            "set" => Ok(KeyType::Set),
            "zset" => Ok(KeyType::ZSet),
            "hash" => Ok(KeyType::Hash),
            _ => Err(DispatchError::InvalidKeyType),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `TYPE` reported for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Probe {
    Missing,
    Known(KeyType),
    Unknown(String),
}

/// Maps data requests onto store commands.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    router: Arc<ConnectionRouter>,
}

impl CommandDispatcher {
    pub fn new(router: Arc<ConnectionRouter>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<ConnectionRouter> {
        &self.router
    }

    /// Serves one request. Never fails: every error ends up in the envelope.
    pub async fn dispatch(
        &self,
        verb: Verb,
        request: &RequestDescriptor,
        params: &Params,
    ) -> ResultEnvelope {
        debug!(%verb, db = request.db, key = %request.key, "Dispatching request");
        let outcome = match verb {
            Verb::Read => self.read(request).await,
            Verb::Create => self.create(request, params).await,
            Verb::Update => self.update(request, params).await,
            Verb::Delete => self.delete(request).await,
        };

        match outcome {
            Ok(result) => ResultEnvelope::success(result),
            Err(e) => {
                debug!(%verb, db = request.db, key = %request.key, error = %e, "Request failed");
                e.into()
            }
        }
    }

    pub async fn read(&self, request: &RequestDescriptor) -> Result<Value, DispatchError> {
        let handle = self.router.get(request.db).await?;
        let mut conn = handle.lock().await;
        let key = request.key.as_str();

        if key.is_empty() {
            debug!(db = request.db, "KEYS *");
            let reply = conn.call(["KEYS", "*"]).await?;
            return Ok(to_json(reply));
        }

        let kind = match probe_type(&mut conn, key).await? {
            Probe::Missing => return Err(DispatchError::KeyNotFound),
            Probe::Unknown(kind) => {
                return Err(DispatchError::UnknownType {
                    key: key.to_string(),
                    kind,
                })
            }
            Probe::Known(kind) => kind,
        };

        match request.modifier {
            Some(Modifier::Type) => return Ok(Value::from(kind.as_str())),
            Some(Modifier::Ttl) => {
                debug!(db = request.db, key, "TTL");
                let reply = conn.call(["TTL", key]).await?;
                return Ok(to_json(reply));
            }
            None => {}
        }

        let reply = match kind {
            KeyType::String => {
                debug!(db = request.db, key, "GET");
                conn.call(["GET", key]).await?
            }
            KeyType::Set => {
                debug!(db = request.db, key, "SMEMBERS");
                conn.call(["SMEMBERS", key]).await?
            }
            KeyType::ZSet => {
                debug!(db = request.db, key, "ZRANGE 0 -1");
                conn.call(["ZRANGE", key, "0", "-1"]).await?
            }
            KeyType::List => {
                debug!(db = request.db, key, "LRANGE 0 -1");
                conn.call(["LRANGE", key, "0", "-1"]).await?
            }
            KeyType::Hash => match request.field.as_deref() {
                Some(field) => {
                    debug!(db = request.db, key, field, "HGET");
                    let reply = conn.call(["HGET", key, field]).await?;
                    if reply.is_null() {
                        return Err(DispatchError::FieldNotFound);
                    }
                    reply
                }
                None => {
                    debug!(db = request.db, key, "HGETALL");
                    let reply = conn.call(["HGETALL", key]).await?;
                    return Ok(pairs_to_object(reply));
                }
            },
        };
        Ok(to_json(reply))
    }

    pub async fn create(
        &self,
        request: &RequestDescriptor,
        params: &Params,
    ) -> Result<Value, DispatchError> {
        let key = require_key(request)?;
        let handle = self.router.get(request.db).await?;
        let mut conn = handle.lock().await;

        if exists(&mut conn, key).await? {
            return Err(DispatchError::KeyExists);
        }

        let kind = match params.get("type") {
            Some(kind) => kind.parse::<KeyType>()?,
            None => KeyType::String,
        };
        let value = params.value().ok_or(DispatchError::MissingValue)?;

        match kind {
            KeyType::String => {
                debug!(db = request.db, key, "SET");
                conn.call(["SET", key, value]).await?;
            }
            KeyType::List => {
                debug!(db = request.db, key, "LPUSH");
                conn.call(["LPUSH", key, value]).await?;
            }
            KeyType::Set => {
                debug!(db = request.db, key, "SADD");
                conn.call(["SADD", key, value]).await?;
            }
            KeyType::ZSet => {
                let ranking = match params.get("ranking") {
                    Some(raw) => parse_ranking(raw)?,
                    None => 1.0,
                };
                debug!(db = request.db, key, ranking, "ZADD");
                let score = ranking.to_string();
                conn.call(["ZADD", key, score.as_str(), value]).await?;
            }
            KeyType::Hash => {
                let field = params.field().ok_or(DispatchError::MissingField)?;
                debug!(db = request.db, key, field, "HSET");
                conn.call(["HSET", key, field, value]).await?;
            }
        }
        Ok(Value::Bool(true))
    }

    /// Applies every requested change, collecting failures instead of
    /// stopping at the first one. A hash update without a field is the one
    /// early exit.
    pub async fn update(
        &self,
        request: &RequestDescriptor,
        params: &Params,
    ) -> Result<Value, DispatchError> {
        let key = require_key(request)?;
        let handle = self.router.get(request.db).await?;
        let mut conn = handle.lock().await;

        if !exists(&mut conn, key).await? {
            return Err(DispatchError::UpdateMissingKey);
        }

        let mut errors: Vec<DispatchError> = Vec::new();

        if let Some(raw) = params.get("ttl") {
            match raw.parse::<i64>() {
                Ok(ttl) => {
                    debug!(db = request.db, key, ttl, "EXPIRE");
                    let ttl = ttl.to_string();
                    if let Err(e) = conn.call(["EXPIRE", key, ttl.as_str()]).await {
                        errors.push(e.into());
                    }
                }
                Err(_) => errors.push(DispatchError::InvalidTtl(raw.to_string())),
            }
        }

        let value = params.value().unwrap_or("");
        let kind = match probe_type(&mut conn, key).await {
            Ok(probe) => probe,
            Err(e) => {
                errors.push(e);
                return Err(join_errors(errors));
            }
        };

        let written = match kind {
            Probe::Known(KeyType::String) => {
                if let Some(raw) = params.get("offset") {
                    match raw.parse::<u64>() {
                        Ok(offset) => {
                            debug!(db = request.db, key, offset, "SETRANGE");
                            let offset = offset.to_string();
                            if let Err(e) =
                                conn.call(["SETRANGE", key, offset.as_str(), value]).await
                            {
                                errors.push(e.into());
                            }
                        }
                        Err(_) => errors.push(DispatchError::InvalidOffset(raw.to_string())),
                    }
                }
                // The full overwrite always follows, offset or not.
                debug!(db = request.db, key, "SET");
                conn.call(["SET", key, value]).await
            }
            Probe::Known(KeyType::Set) => {
                debug!(db = request.db, key, "SADD");
                conn.call(["SADD", key, value]).await
            }
            Probe::Known(KeyType::ZSet) => {
                let mut ranking = 1.0;
                if let Some(raw) = params.get("ranking") {
                    match parse_ranking(raw) {
                        Ok(parsed) => ranking = parsed,
                        Err(e) => errors.push(e),
                    }
                }
                debug!(db = request.db, key, ranking, "ZADD");
                let score = ranking.to_string();
                conn.call(["ZADD", key, score.as_str(), value]).await
            }
            Probe::Known(KeyType::Hash) => {
                let field = params.field().ok_or(DispatchError::MissingUpdateField)?;
                debug!(db = request.db, key, field, "HSET");
                conn.call(["HSET", key, field, value]).await
            }
            Probe::Known(KeyType::List) => {
                let command = if params.get("side") == Some("left") {
                    "LPUSH"
                } else {
                    "RPUSH"
                };
                debug!(db = request.db, key, command);
                conn.call([command, key, value]).await
            }
            Probe::Missing => {
                errors.push(DispatchError::UpdateMissingKey);
                Ok(RespValue::Null)
            }
            Probe::Unknown(kind) => {
                errors.push(DispatchError::UnknownType {
                    key: key.to_string(),
                    kind,
                });
                Ok(RespValue::Null)
            }
        };
        if let Err(e) = written {
            errors.push(e.into());
        }

        if errors.is_empty() {
            Ok(Value::Bool(true))
        } else {
            Err(join_errors(errors))
        }
    }

    pub async fn delete(&self, request: &RequestDescriptor) -> Result<Value, DispatchError> {
        let key = require_key(request)?;
        let handle = self.router.get(request.db).await?;
        let mut conn = handle.lock().await;

        if !exists(&mut conn, key).await? {
            return Err(DispatchError::KeyNotFound);
        }
        debug!(db = request.db, key, "DEL");
        conn.call(["DEL", key]).await?;
        Ok(Value::Bool(true))
    }
}

fn require_key(request: &RequestDescriptor) -> Result<&str, DispatchError> {
    if request.key.is_empty() {
        return Err(DispatchError::MissingKey);
    }
    Ok(&request.key)
}

async fn exists(conn: &mut Connection, key: &str) -> Result<bool, DispatchError> {
    let reply = conn.call(["EXISTS", key]).await?;
    match reply.as_integer() {
        Some(n) => Ok(n > 0),
        None => Err(unexpected("EXISTS", &reply)),
    }
}

async fn probe_type(conn: &mut Connection, key: &str) -> Result<Probe, DispatchError> {
    let reply = conn.call(["TYPE", key]).await?;
    let kind = reply.as_str().ok_or_else(|| unexpected("TYPE", &reply))?;
    Ok(match kind {
        "none" => Probe::Missing,
        other => match other.parse() {
            Ok(kind) => Probe::Known(kind),
            Err(_) => Probe::Unknown(other.to_string()),
        },
    })
}

fn parse_ranking(raw: &str) -> Result<f64, DispatchError> {
    raw.parse::<f64>()
        .ok()
        .filter(|r| !r.is_nan())
        .ok_or_else(|| DispatchError::InvalidRanking(raw.to_string()))
}

fn unexpected(command: &str, reply: &RespValue) -> DispatchError {
    DispatchError::Store(StoreError::UnexpectedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    })
}

/// Folds accumulated update errors into one, messages joined by a space.
fn join_errors(mut errors: Vec<DispatchError>) -> DispatchError {
    if errors.len() == 1 {
        return errors.remove(0);
    }
    DispatchError::Multiple(errors.iter().map(|e| e.to_string()).collect())
}

/// Converts a store reply into a JSON-safe value.
pub fn to_json(reply: RespValue) -> Value {
    match reply {
        RespValue::Integer(n) => Value::from(n),
        RespValue::Null => Value::Null,
        RespValue::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        other => other.to_text().map(Value::String).unwrap_or(Value::Null),
    }
}

/// Turns a flat `[field, value, field, value, ...]` reply into an object.
pub fn pairs_to_object(reply: RespValue) -> Value {
    let mut map = Map::new();
    if let Some(items) = reply.into_array() {
        for pair in items.chunks(2) {
            if let [field, value] = pair {
                if let Some(field) = field.to_text() {
                    map.insert(field, to_json(value.clone()));
                }
            }
        }
    }
    Value::Object(map)
}
