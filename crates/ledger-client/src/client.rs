//! Collaborator traits consumed by the load test engine.

use async_trait::async_trait;
use futures::StreamExt;
use ledger_core::{CommitEvent, CorrelationId, LedgerError, ReceiptStatus, Submission, TransactionRequest};
use tokio::sync::mpsc;

/// Submission side of a ledger backend.
///
/// Implementations must be usable from many workers at once; a submit call
/// must not serialize behind other in-flight submits.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Short backend name for logs and reports.
    fn name(&self) -> &str;

    /// Establish (or verify) the session with the backend.
    async fn connect(&self) -> Result<(), LedgerError>;

    /// Submit one transaction. Failures surface as
    /// [`LedgerError::Submission`] and are never retried by the caller.
    async fn submit(&self, request: &TransactionRequest) -> Result<Submission, LedgerError>;

    /// Submit the one-time `InitLedger` transaction.
    async fn initialize_ledger(
        &self,
        channel: &str,
        chaincode: &str,
    ) -> Result<Submission, LedgerError> {
        self.submit(&TransactionRequest::init_ledger(channel, chaincode))
            .await
    }

    /// Release backend resources.
    async fn close(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Receipt lookups kept in flight at once by [`ReceiptSource::get_outcomes`].
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 16;

/// Poll-based outcome lookup (gateway backends).
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    /// Look up one receipt. "Not yet available" is [`ReceiptStatus::Pending`],
    /// not an error.
    async fn get_outcome(&self, id: &CorrelationId) -> Result<ReceiptStatus, LedgerError>;

    /// Upper bound on concurrent lookups during one sweep.
    fn max_concurrent_lookups(&self) -> usize {
        DEFAULT_LOOKUP_CONCURRENCY
    }

    /// Look up many receipts in one sweep, in the order of `ids`.
    ///
    /// The default keeps at most [`max_concurrent_lookups`] single lookups in
    /// flight; backends with a native batch query override it.
    ///
    /// [`max_concurrent_lookups`]: ReceiptSource::max_concurrent_lookups
    async fn get_outcomes(
        &self,
        ids: &[CorrelationId],
    ) -> Vec<(CorrelationId, Result<ReceiptStatus, LedgerError>)> {
        let limit = self.max_concurrent_lookups().max(1);
        futures::stream::iter(ids.iter().cloned())
            .map(|id| async move {
                let outcome = self.get_outcome(&id).await;
                (id, outcome)
            })
            .buffered(limit)
            .collect()
            .await
    }
}

/// What to subscribe to on an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTopic {
    pub channel: String,
    pub chaincode: String,
    /// Maximum commit notifications delivered per batch.
    pub batch_size: usize,
}

/// Identifies a live subscription so it can be torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: String,
}

/// A live commit notification stream.
///
/// Each message is one delivered batch; a payload that could not be
/// decoded arrives as [`LedgerError::Protocol`] without closing the stream.
/// The stream ends when the subscription is torn down.
pub struct EventSubscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::Receiver<Result<Vec<CommitEvent>, LedgerError>>,
}

/// Push-based outcome delivery (direct backends).
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self, topic: &EventTopic) -> Result<EventSubscription, LedgerError>;

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), LedgerError>;
}
