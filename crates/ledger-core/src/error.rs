//! Error taxonomy shared by ledger clients and the load test engine.

use thiserror::Error;

/// Errors raised while talking to the ledger or generating work.
///
/// Only [`LedgerError::Connection`], [`LedgerError::Entropy`] and
/// [`LedgerError::Precondition`] abort a run. Every other variant is
/// absorbed into a per-item [`crate::Outcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The backend could not be reached or refused the session.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single submission was rejected by the backend.
    #[error("Submission error: {0}")]
    Submission(String),

    /// No confirmation arrived for a correlation id within the window.
    #[error("Correlation timeout: {id} unresolved after {waited_ms}ms")]
    CorrelationTimeout { id: String, waited_ms: u64 },

    /// The randomness source could not produce a workload identifier.
    #[error("Entropy error: {0}")]
    Entropy(String),

    /// A receipt or event payload could not be interpreted.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A receipt or subscription query failed in transit.
    #[error("Query error: {0}")]
    Query(String),

    /// The run was configured with an invalid combination of inputs.
    #[error("Precondition violated: {0}")]
    Precondition(String),
}

impl LedgerError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::Connection(_) | LedgerError::Entropy(_) | LedgerError::Precondition(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(LedgerError::Connection("refused".into()).is_fatal());
        assert!(LedgerError::Entropy("os rng".into()).is_fatal());
        assert!(LedgerError::Precondition("workers".into()).is_fatal());
        assert!(!LedgerError::Submission("busy".into()).is_fatal());
        assert!(!LedgerError::Protocol("bad json".into()).is_fatal());
        assert!(!LedgerError::Query("503".into()).is_fatal());
    }

    #[test]
    fn test_timeout_display() {
        let err = LedgerError::CorrelationTimeout {
            id: "tx-1".to_string(),
            waited_ms: 60_000,
        };
        assert_eq!(
            err.to_string(),
            "Correlation timeout: tx-1 unresolved after 60000ms"
        );
    }
}
