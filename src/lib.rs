//! # FlashGate - An HTTP Gateway for Redis-Compatible Stores
//!
//! FlashGate exposes a key-value store's data model over HTTP. A URL names
//! a logical database and a key; the HTTP method names the intent; the
//! gateway works out the key's type and issues the matching store command.
//! Every response is a JSON `{"result": ..., "error": ...}` envelope.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashGate                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌───────────────────┐    ┌──────────────────────┐   │
//! │  │ HTTP Router │───>│ CommandDispatcher │───>│  ConnectionRouter    │   │
//! │  │   (axum)    │    │ read/create/      │    │  db 0 ─> Connection  │   │
//! │  └─────────────┘    │ update/delete     │    │  db 3 ─> Connection  │   │
//! │                     └───────────────────┘    │  ...  (lazy, cached) │   │
//! │                                              └──────────┬───────────┘   │
//! │                                                         │ RESP/TCP      │
//! │  ┌───────────────────────────────┐                      ▼               │
//! │  │   Topology discovery task     │ ──INFO replication─> store           │
//! │  │  (master ─> replicas,         │                                      │
//! │  │   slave  ─> master)           │                                      │
//! │  └───────────────────────────────┘                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashgate::commands::CommandDispatcher;
//! use flashgate::http::{router, AppState};
//! use flashgate::store::ConnectionRouter;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connections = Arc::new(ConnectionRouter::new("127.0.0.1:6379", None));
//!     connections.populate().await?;
//!
//!     let app = router(AppState {
//!         dispatcher: CommandDispatcher::new(connections),
//!         topology: None,
//!         info_disabled: false,
//!     });
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:6380").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Requests
//!
//! | Method | Path | Effect |
//! |--------|------|--------|
//! | GET | `/0` | list every key in database 0 |
//! | GET | `/0/user:1` | read the key, shaped by its type |
//! | GET | `/0/user:1/ttl` | remaining TTL in seconds |
//! | POST | `/0/user:1` | create (`type`, `value`, `field`, `ranking`) |
//! | PUT | `/0/user:1` | update (`value`, `ttl`, `offset`, `side`, ...) |
//! | DELETE | `/0/user:1` | delete |
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP types and the incremental reply parser
//! - [`store`]: store connections, the per-database router, status reports
//! - [`topology`]: replication topology discovery
//! - [`commands`]: request descriptors and the command dispatcher
//! - [`http`]: the axum router
//! - [`config`]: the JSON configuration file

pub mod commands;
pub mod config;
pub mod http;
pub mod protocol;
pub mod store;
pub mod topology;

#[cfg(test)]
mod fake;

// Re-export commonly used types for convenience
pub use commands::{CommandDispatcher, ResultEnvelope};
pub use config::Config;
pub use protocol::{ParseError, RespParser, RespValue};
pub use store::{ConnectionRouter, StoreError};
pub use topology::Host;

/// The default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:6380";

/// The default upstream store address
pub const DEFAULT_STORE_ADDR: &str = "127.0.0.1:6379";

/// Version of FlashGate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
