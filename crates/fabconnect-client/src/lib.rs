//! FabConnect backend for the fabric-loadtest framework.
//!
//! FabConnect is a REST gateway in front of a Fabric network. It accepts
//! transactions asynchronously and reports their outcome two ways, which map
//! onto the two backend variants:
//!
//! ```text
//!   POST /transactions?fly-sync=false ──► { sent, id }
//!        │
//!        ├── Gateway variant:  GET /receipts/{id}  (polled)
//!        │                     headers.type = TransactionSuccess | TransactionFailure | Error
//!        │
//!        └── Direct variant:   POST /eventstreams, POST /subscriptions
//!                              websocket: listen ─► [events] ─► ack ─► [events] ...
//!                              DELETE /eventstreams/{id} on teardown
//! ```
//!
//! Saturation responses ("Too many in-flight transactions") are retried
//! inside [`FabconnectClient`] with bounded exponential backoff; every other
//! submit failure surfaces immediately.

pub mod args;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod model;

// Re-exports for convenience
pub use args::FabconnectArgs;
pub use client::{FabconnectClient, SubmitHandle};
pub use config::{FabconnectConfig, RetryPolicy};
pub use error::FabconnectError;
pub use events::FabconnectEvents;
pub use model::CorrelateBy;
