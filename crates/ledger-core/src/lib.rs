//! Core types for the fabric-loadtest framework.
//!
//! This crate provides the data model shared by every stage of a load test
//! run:
//!
//! - [`Workload`] - One unit of submitted work (a simulated asset transaction)
//! - [`TransactionRequest`] - The chaincode invocation sent to the ledger
//! - [`Submission`] / [`SubmissionResult`] - What a worker observed when submitting
//! - [`Outcome`] - The terminal classification of a submitted workload
//! - [`LedgerError`] - The error taxonomy shared by clients and the engine
//!
//! # Architecture
//!
//! ```text
//! ledger-core (this crate)
//!    │
//!    ├─── loadtest-generator  (produces Workloads)
//!    ├─── ledger-client       (backend traits, simulated ledger)
//!    ├─── fabconnect-client   (REST gateway + websocket events)
//!    └─── loadtest-engine     (dispatcher, correlator, aggregator)
//! ```

pub mod error;
pub mod outcome;
pub mod types;

// Re-exports for convenience
pub use error::LedgerError;
pub use outcome::{
    CommitEvent, Confirmation, Outcome, OutcomeStatus, ReceiptStatus, Submission,
    SubmissionResult,
};
pub use types::{CorrelationId, TransactionRequest, Workload, WorkloadId};
