//! Concurrent transaction submission and outcome correlation.
//!
//! A run submits exactly `tx_count` generated workloads through a bounded
//! pool of workers and resolves each of them to exactly one outcome
//! (success, failure or timeout) before reporting:
//!
//! ```text
//!  WorkloadGenerator ─► WorkerPool ──SubmissionResult──► Correlator ─► Aggregator ─► Report
//!                           │                                ▲
//!                           ▼                                │
//!                      LedgerClient            commit events │ receipt polls
//!                                              (EventSource) │ (ReceiptSource)
//! ```
//!
//! [`LoadTestRun`] wires the pieces together for a [`ledger_client::Backend`].

pub mod aggregator;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod partition;
pub mod report;
pub mod run;

// Re-exports for convenience
pub use aggregator::Aggregator;
pub use config::{parse_duration, DispatchStrategy, RunConfig, RunMode, RunProfile, MAX_WORKERS};
pub use correlator::{CorrelationSummary, Correlator, CorrelatorSettings, RunState, Tracking};
pub use dispatcher::{PoolHandle, PoolSummary, WorkerPool};
pub use error::EngineError;
pub use report::{render, Diagnostics, OutputFormat, Report, RunDescription};
pub use run::LoadTestRun;
