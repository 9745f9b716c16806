//! Store Access Layer
//!
//! Everything the gateway needs to talk to the upstream store:
//!
//! - [`connection`]: a RESP connection bound to one logical database
//! - [`router`]: lazily opened, cached connections keyed by database index
//! - [`info`]: parsing of the store's `INFO` status report
//!
//! ## Example
//!
//! ```ignore
//! use flashgate::store::ConnectionRouter;
//!
//! let router = ConnectionRouter::new("127.0.0.1:6379", None);
//! router.populate().await?;
//!
//! let db = router.get(2).await?;
//! let reply = db.lock().await.call(["TYPE", "user:101"]).await?;
//! ```

pub mod connection;
pub mod info;
pub mod router;

/// A logical database index on a store.
pub type DbIndex = u16;

pub use connection::{Connection, StoreError};
pub use info::{InfoError, InfoReport, InfoSection};
pub use router::{ConnectionRouter, DbHandle};
