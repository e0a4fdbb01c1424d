//! Submission results and terminal outcomes.

use crate::error::LedgerError;
use crate::types::{CorrelationId, WorkloadId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Terminal classification of a submitted workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
    Timeout,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Failure => write!(f, "failure"),
            OutcomeStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// A backend's verdict on one transaction.
///
/// `elapsed` is the backend-reported processing time when the backend
/// provides one; otherwise the correlator measures it locally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub status: OutcomeStatus,
    pub elapsed: Option<Duration>,
}

impl Confirmation {
    pub fn success() -> Self {
        Self {
            status: OutcomeStatus::Success,
            elapsed: None,
        }
    }

    pub fn failure() -> Self {
        Self {
            status: OutcomeStatus::Failure,
            elapsed: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

/// What a backend returned for an accepted submit call.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The backend accepted the transaction; its outcome arrives later.
    Accepted(CorrelationId),
    /// The backend confirmed the transaction inline.
    Confirmed {
        id: CorrelationId,
        confirmation: Confirmation,
    },
}

impl Submission {
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            Submission::Accepted(id) => id,
            Submission::Confirmed { id, .. } => id,
        }
    }
}

/// Produced exactly once per submission attempt by the worker that made it.
#[derive(Debug)]
pub struct SubmissionResult {
    pub worker: usize,
    pub workload_id: WorkloadId,
    /// Wall time the submit call took.
    pub round_trip: Duration,
    pub result: Result<Submission, LedgerError>,
}

impl SubmissionResult {
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.result.as_ref().ok().map(Submission::correlation_id)
    }

    pub fn submit_error(&self) -> Option<&LedgerError> {
        self.result.as_ref().err()
    }
}

/// Answer to a single receipt poll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    /// The backend has no verdict yet; poll again later.
    Pending,
    Resolved(Confirmation),
}

/// A ledger commit notification delivered by an event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub correlation_id: CorrelationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub confirmation: Confirmation,
}

impl CommitEvent {
    pub fn committed(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            block_number: None,
            confirmation: Confirmation::success(),
        }
    }
}

/// Terminal outcome of one workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub workload_id: WorkloadId,
    /// Absent when the submit call itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    pub status: OutcomeStatus,
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn resolved(
        workload_id: WorkloadId,
        correlation_id: CorrelationId,
        confirmation: Confirmation,
        measured: Duration,
    ) -> Self {
        Self {
            workload_id,
            correlation_id: Some(correlation_id),
            status: confirmation.status,
            elapsed: confirmation.elapsed.unwrap_or(measured),
            error: None,
        }
    }

    pub fn submit_failed(workload_id: WorkloadId, error: &LedgerError, elapsed: Duration) -> Self {
        Self {
            workload_id,
            correlation_id: None,
            status: OutcomeStatus::Failure,
            elapsed,
            error: Some(error.to_string()),
        }
    }

    pub fn timed_out(workload_id: WorkloadId, correlation_id: CorrelationId, waited: Duration) -> Self {
        let error = LedgerError::CorrelationTimeout {
            id: correlation_id.to_string(),
            waited_ms: waited.as_millis() as u64,
        };
        Self {
            workload_id,
            correlation_id: Some(correlation_id),
            status: OutcomeStatus::Timeout,
            elapsed: waited,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_elapsed_preferred_over_measured() {
        let outcome = Outcome::resolved(
            WorkloadId::new("asset-1"),
            CorrelationId::from("tx-1"),
            Confirmation::success().with_elapsed(Duration::from_millis(12_500)),
            Duration::from_secs(20),
        );
        assert_eq!(outcome.elapsed, Duration::from_millis(12_500));
        assert!(outcome.is_success());
    }

    #[test]
    fn test_measured_elapsed_fallback() {
        let outcome = Outcome::resolved(
            WorkloadId::new("asset-1"),
            CorrelationId::from("tx-1"),
            Confirmation::failure(),
            Duration::from_secs(3),
        );
        assert_eq!(outcome.elapsed, Duration::from_secs(3));
        assert_eq!(outcome.status, OutcomeStatus::Failure);
    }

    #[test]
    fn test_timeout_outcome_carries_error() {
        let outcome = Outcome::timed_out(
            WorkloadId::new("asset-2"),
            CorrelationId::from("tx-2"),
            Duration::from_secs(60),
        );
        assert_eq!(outcome.status, OutcomeStatus::Timeout);
        assert!(outcome.error.unwrap().contains("tx-2"));
    }

    #[test]
    fn test_submission_result_accessors() {
        let ok = SubmissionResult {
            worker: 0,
            workload_id: WorkloadId::new("asset-3"),
            round_trip: Duration::from_millis(5),
            result: Ok(Submission::Accepted(CorrelationId::from("tx-3"))),
        };
        assert_eq!(ok.correlation_id().map(|c| c.as_str()), Some("tx-3"));
        assert!(ok.submit_error().is_none());

        let failed = SubmissionResult {
            result: Err(LedgerError::Submission("busy".into())),
            ..ok
        };
        assert!(failed.correlation_id().is_none());
        assert!(failed.submit_error().is_some());
    }
}
