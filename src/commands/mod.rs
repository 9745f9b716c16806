//! Command Dispatch Module
//!
//! The data-request path of the gateway:
//!
//! ```text
//! HTTP request
//!       │
//!       ▼
//! ┌───────────────────┐
//! │ RequestDescriptor │  db, key, field, modifier  (request)
//! │ Params            │  type, value, ranking, ttl, offset, side  (params)
//! └─────────┬─────────┘
//!           │
//!           ▼
//! ┌───────────────────┐
//! │ CommandDispatcher │  verb + key type ──> store commands  (handler)
//! └─────────┬─────────┘
//!           │
//!           ▼
//! ┌───────────────────┐
//! │ ResultEnvelope    │  {"result": ..., "error": ...}  (envelope)
//! └───────────────────┘
//! ```

pub mod envelope;
pub mod handler;
pub mod params;
pub mod request;

pub use envelope::ResultEnvelope;
pub use handler::{CommandDispatcher, DispatchError, KeyType};
pub use params::Params;
pub use request::{Modifier, RequestDescriptor, Verb};
