//! Store Connection
//!
//! One TCP connection to an upstream store, speaking RESP. A connection is
//! bound to a single logical database: after `open` has authenticated and
//! issued `SELECT`, every command sent on it targets that database.
//!
//! ## Request Cycle
//!
//! ```text
//! call(["HGET", key, field])
//!        │
//!        ▼
//! ┌──────────────────────┐
//! │ serialize + flush    │
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐   incomplete   ┌──────────────────────┐
//! │ parse buffered bytes │ ─────────────> │ read more from socket│
//! └──────────┬───────────┘ <───────────── └──────────────────────┘
//!            ▼
//!   -ERR ... → StoreError::Reply
//!   anything else → Ok(RespValue)
//! ```
//!
//! No deadline is applied to any call: a store that stops answering holds
//! the caller until the socket is closed.
//!
//! A call that is dropped between writing its command and reading the reply
//! leaves that reply unread on the socket. The connection remembers this and
//! refuses further commands instead of handing the stale reply to the next
//! caller. The same happens after any transport failure. The router replaces
//! such a connection on the next `get`.

use crate::protocol::{ParseError, RespParser, RespValue};
use crate::store::info::{self, InfoError, InfoReport, InfoSection};
use crate::store::DbIndex;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

/// Initial read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors raised by the connection layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Could not connect to {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("AUTH failed: {0}")]
    AuthenticationFailed(String),

    #[error("Could not select database #{db}: {message}")]
    DatabaseSelectFailed { db: DbIndex, message: String },

    /// An error reply from the store, passed through verbatim.
    #[error("{0}")]
    Reply(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ParseError),

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Connection closed by the store")]
    Closed,

    #[error("Connection to {0} is unusable: an earlier command did not complete")]
    Desynchronized(String),

    #[error(transparent)]
    Info(#[from] InfoError),
}

impl StoreError {
    /// True for failures that leave the connection itself unusable, as
    /// opposed to the store refusing a single command.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_)
                | StoreError::Protocol(_)
                | StoreError::Closed
                | StoreError::Desynchronized(_)
        )
    }
}

/// A RESP connection to one logical database of a store.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    addr: String,
    db: DbIndex,
    buffer: BytesMut,
    parser: RespParser,
    scratch: Vec<u8>,
    /// Set from the write of a command until its reply has been read.
    in_flight: bool,
}

impl Connection {
    /// Opens a bare TCP connection. No credentials are sent and the store's
    /// default database (0) is active.
    pub async fn connect(addr: &str) -> Result<Self, StoreError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| StoreError::ConnectionFailed {
                addr: addr.to_string(),
                source,
            })?;
        let _ = stream.set_nodelay(true);

        trace!(addr, "TCP connection established");
        Ok(Self {
            stream: BufWriter::new(stream),
            addr: addr.to_string(),
            db: 0,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            scratch: Vec::with_capacity(256),
            in_flight: false,
        })
    }

    /// Connects, authenticates when `password` is non-empty, and selects `db`.
    pub async fn open(
        addr: &str,
        password: Option<&str>,
        db: DbIndex,
    ) -> Result<Self, StoreError> {
        let mut conn = Self::connect(addr).await?;
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            conn.authenticate(password).await?;
        }
        conn.select(db).await?;
        info!(addr, db, "Connected to database");
        Ok(conn)
    }

    /// Sends `AUTH`. Any reply other than `OK` is an authentication failure.
    pub async fn authenticate(&mut self, password: &str) -> Result<(), StoreError> {
        match self.call(["AUTH", password]).await {
            Ok(reply) if reply.as_str() == Some("OK") => Ok(()),
            Ok(reply) => Err(StoreError::AuthenticationFailed(reply.to_string())),
            Err(StoreError::Reply(message)) => Err(StoreError::AuthenticationFailed(message)),
            Err(e) => Err(e),
        }
    }

    /// Sends `SELECT db` and records the new active database.
    pub async fn select(&mut self, db: DbIndex) -> Result<(), StoreError> {
        let index = db.to_string();
        match self.call(["SELECT", index.as_str()]).await {
            Ok(reply) if reply.as_str() == Some("OK") => {
                self.db = db;
                Ok(())
            }
            Ok(reply) => Err(StoreError::DatabaseSelectFailed {
                db,
                message: reply.to_string(),
            }),
            Err(StoreError::Reply(message)) => {
                Err(StoreError::DatabaseSelectFailed { db, message })
            }
            Err(e) => Err(e),
        }
    }

    /// Sends one command and waits for its reply.
    ///
    /// Error replies become [`StoreError::Reply`]; every other reply,
    /// including null, is returned as-is. Fails with
    /// [`StoreError::Desynchronized`] once the connection is broken.
    pub async fn call<I, S>(&mut self, parts: I) -> Result<RespValue, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        if self.in_flight {
            return Err(StoreError::Desynchronized(self.addr.clone()));
        }
        let command = RespValue::command(parts);

        self.scratch.clear();
        command.serialize_into(&mut self.scratch);

        // Cleared only once the reply is in; an error or a dropped future
        // leaves it set.
        self.in_flight = true;
        self.stream.write_all(&self.scratch).await?;
        self.stream.flush().await?;
        let reply = self.read_reply().await?;
        self.in_flight = false;

        match reply {
            RespValue::Error(message) => Err(StoreError::Reply(message)),
            reply => Ok(reply),
        }
    }

    /// Fetches and parses a status report section.
    ///
    /// The section name is validated before anything is sent.
    pub async fn info(&mut self, section: &str) -> Result<InfoReport, StoreError> {
        let section: InfoSection = section.parse()?;
        let reply = match section {
            InfoSection::Default => self.call(["INFO"]).await?,
            other => self.call(["INFO", other.as_str()]).await?,
        };

        let text = reply.to_text().ok_or_else(|| StoreError::UnexpectedReply {
            command: "INFO".to_string(),
            reply: reply.to_string(),
        })?;
        debug!(addr = %self.addr, %section, bytes = text.len(), "Fetched status report");
        Ok(info::parse_report(&text)?)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The database selected on this connection.
    pub fn db(&self) -> DbIndex {
        self.db
    }

    /// Whether an interrupted or failed call has left this connection
    /// out of step with the store.
    pub fn is_broken(&self) -> bool {
        self.in_flight
    }

    async fn read_reply(&mut self) -> Result<RespValue, StoreError> {
        loop {
            if !self.buffer.is_empty() {
                if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(value);
                }
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(StoreError::Closed);
            }
            trace!(addr = %self.addr, bytes = n, "Read reply data");
        }
    }
}
