//! Ledger backend client interface for the fabric-loadtest framework.
//!
//! The load test engine never talks to a ledger directly. It drives a
//! [`Backend`], which bundles a [`LedgerClient`] (submit, initialize) with
//! exactly one way of learning the eventual outcome of a submission:
//!
//! ```text
//!                     ┌───────────────────────────────┐
//!                     │            Backend            │
//!                     └───────────────┬───────────────┘
//!              ┌──────────────────────┴──────────────────────┐
//!              ▼                                             ▼
//!   Direct { client, events }                    Gateway { client, receipts }
//!   - submit -> tx id                            - submit -> receipt id
//!   - EventSource streams commits                - ReceiptSource polled in batches
//!   - events: None => submit confirms inline
//! ```
//!
//! [`SimulatedLedger`] implements every capability in-process and is used for
//! dry runs and tests.

pub mod backend;
pub mod client;
pub mod simulated;

// Re-exports for convenience
pub use backend::{Backend, TrackingMode};
pub use client::{
    EventSource, EventSubscription, EventTopic, LedgerClient, ReceiptSource, SubscriptionHandle,
    DEFAULT_LOOKUP_CONCURRENCY,
};
pub use simulated::{SimulatedConfig, SimulatedLedger};
