//! Error types for the load test engine.

use ledger_core::LedgerError;
use loadtest_generator::GeneratorError;
use thiserror::Error;

/// Errors that abort a run.
///
/// Per-item failures never appear here; they are folded into the report.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Workload generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Run ended with {completed}/{requested} outcomes")]
    Incomplete { completed: u64, requested: u64 },

    #[error("Invalid duration: {0}")]
    Duration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Worker(err.to_string())
    }
}
