//! In-process simulated ledger.
//!
//! Behaves like a permissioned ledger behind a gateway: submissions are
//! accepted (or rejected) after `submit_latency`, commit after
//! `commit_latency`, and the commit is observable through receipts and
//! through event subscriptions. Failure injection knobs make the
//! pathological cases reproducible.

use crate::client::{
    EventSource, EventSubscription, EventTopic, LedgerClient, ReceiptSource, SubscriptionHandle,
};
use async_trait::async_trait;
use ledger_core::{
    CommitEvent, Confirmation, CorrelationId, LedgerError, ReceiptStatus, Submission,
    TransactionRequest,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Capacity of the delivered-batch channel handed to subscribers.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Behaviour knobs of the simulated ledger.
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Time a submit call blocks before returning.
    pub submit_latency: Duration,
    /// Time between acceptance and commit.
    pub commit_latency: Duration,
    /// Reject every Nth submission synchronously.
    pub fail_every: Option<u64>,
    /// Commit every Nth accepted submission with a failure status.
    pub reject_every: Option<u64>,
    /// Receipt polls answered `Pending` before a committed receipt resolves.
    pub pending_polls: u32,
    /// Return `Submission::Confirmed` instead of `Submission::Accepted`.
    pub confirm_inline: bool,
    /// Deliver every commit notification twice.
    pub duplicate_events: bool,
    /// Accept submissions but never commit them.
    pub never_confirm: bool,
    /// Refuse connections.
    pub unreachable: bool,
    /// Processing time reported in confirmations.
    pub reported_elapsed: Option<Duration>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            submit_latency: Duration::from_millis(2),
            commit_latency: Duration::from_millis(20),
            fail_every: None,
            reject_every: None,
            pending_polls: 0,
            confirm_inline: false,
            duplicate_events: false,
            never_confirm: false,
            unreachable: false,
            reported_elapsed: None,
        }
    }
}

impl SimulatedConfig {
    /// A ledger that answers instantly.
    pub fn instant() -> Self {
        Self {
            submit_latency: Duration::ZERO,
            commit_latency: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_submit_latency(mut self, latency: Duration) -> Self {
        self.submit_latency = latency;
        self
    }

    pub fn with_commit_latency(mut self, latency: Duration) -> Self {
        self.commit_latency = latency;
        self
    }

    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n);
        self
    }

    pub fn with_reject_every(mut self, n: u64) -> Self {
        self.reject_every = Some(n);
        self
    }

    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn with_inline_confirmation(mut self) -> Self {
        self.confirm_inline = true;
        self
    }

    pub fn with_duplicate_events(mut self) -> Self {
        self.duplicate_events = true;
        self
    }

    pub fn never_confirming(mut self) -> Self {
        self.never_confirm = true;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_reported_elapsed(mut self, elapsed: Duration) -> Self {
        self.reported_elapsed = Some(elapsed);
        self
    }
}

struct SimulatedTx {
    commit_at: Instant,
    confirmation: Confirmation,
    polls: u32,
}

#[derive(Default)]
struct LedgerState {
    submissions: u64,
    accepted: u64,
    block_height: u64,
    initialized: bool,
    transactions: HashMap<CorrelationId, SimulatedTx>,
    subscribers: HashMap<String, mpsc::UnboundedSender<Result<CommitEvent, LedgerError>>>,
    next_subscription: u64,
}

/// Simulated ledger implementing every backend capability.
#[derive(Clone, Default)]
pub struct SimulatedLedger {
    config: SimulatedConfig,
    state: Arc<Mutex<LedgerState>>,
}

impl SimulatedLedger {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    pub fn config(&self) -> &SimulatedConfig {
        &self.config
    }

    /// Submit calls received, including rejected ones.
    pub fn submissions(&self) -> u64 {
        self.state.lock().submissions
    }

    /// Blocks committed so far.
    pub fn block_height(&self) -> u64 {
        self.state.lock().block_height
    }

    /// Whether the `InitLedger` transaction has been accepted.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Transactions whose outcome has not been handed out yet.
    pub fn unresolved_count(&self) -> usize {
        self.state.lock().transactions.len()
    }

    /// Live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Deliver a commit notification to every live subscriber.
    pub fn publish(&self, event: CommitEvent) {
        Self::broadcast(&self.state, Ok(event), self.config.duplicate_events);
    }

    /// Deliver an undecodable payload to every live subscriber.
    pub fn publish_malformed(&self, detail: &str) {
        Self::broadcast(
            &self.state,
            Err(LedgerError::Protocol(detail.to_string())),
            false,
        );
    }

    /// Returns whether any subscriber received the event.
    fn broadcast(
        state: &Mutex<LedgerState>,
        event: Result<CommitEvent, LedgerError>,
        duplicate: bool,
    ) -> bool {
        let mut state = state.lock();
        Self::deliver(&mut state, event, duplicate)
    }

    fn deliver(
        state: &mut LedgerState,
        event: Result<CommitEvent, LedgerError>,
        duplicate: bool,
    ) -> bool {
        state.subscribers.retain(|_, tx| {
            let delivered = tx.send(event.clone()).is_ok();
            if delivered && duplicate {
                let _ = tx.send(event.clone());
            }
            delivered
        });
        !state.subscribers.is_empty()
    }

    fn record_submission(
        &self,
        request: &TransactionRequest,
    ) -> Result<(Submission, Confirmation), LedgerError> {
        let mut state = self.state.lock();
        state.submissions += 1;
        let seq = state.submissions;

        if let Some(n) = self.config.fail_every {
            if n > 0 && seq % n == 0 {
                return Err(LedgerError::Submission(format!(
                    "simulated endorsement failure for {}({})",
                    request.function,
                    request.args.first().map(String::as_str).unwrap_or_default()
                )));
            }
        }

        state.accepted += 1;
        let mut confirmation = match self.config.reject_every {
            Some(n) if n > 0 && state.accepted % n == 0 => Confirmation::failure(),
            _ => Confirmation::success(),
        };
        if let Some(elapsed) = self.config.reported_elapsed {
            confirmation = confirmation.with_elapsed(elapsed);
        }

        let id = CorrelationId::new(uuid::Uuid::new_v4().simple().to_string());
        if !self.config.confirm_inline {
            state.transactions.insert(
                id.clone(),
                SimulatedTx {
                    commit_at: Instant::now() + self.config.commit_latency,
                    confirmation,
                    polls: 0,
                },
            );
        }
        if request.is_init {
            state.initialized = true;
        }

        let submission = if self.config.confirm_inline {
            Submission::Confirmed { id, confirmation }
        } else {
            Submission::Accepted(id)
        };
        Ok((submission, confirmation))
    }

    fn schedule_commit(&self, id: CorrelationId, confirmation: Confirmation) {
        let state = Arc::clone(&self.state);
        let latency = self.config.commit_latency;
        let duplicate = self.config.duplicate_events;

        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let mut guard = state.lock();
            guard.block_height += 1;
            let event = CommitEvent {
                correlation_id: id.clone(),
                block_number: Some(guard.block_height),
                confirmation,
            };
            // Without subscribers the outcome stays available to receipt polls.
            if Self::deliver(&mut guard, Ok(event), duplicate) {
                guard.transactions.remove(&id);
            }
        });
    }

    fn poll_receipt(&self, id: &CorrelationId) -> ReceiptStatus {
        let mut state = self.state.lock();
        let Some(tx) = state.transactions.get_mut(id) else {
            return ReceiptStatus::Pending;
        };

        tx.polls += 1;
        if self.config.never_confirm
            || tx.polls <= self.config.pending_polls
            || Instant::now() < tx.commit_at
        {
            return ReceiptStatus::Pending;
        }
        let confirmation = tx.confirmation;
        state.transactions.remove(id);
        ReceiptStatus::Resolved(confirmation)
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn connect(&self) -> Result<(), LedgerError> {
        if self.config.unreachable {
            return Err(LedgerError::Connection(
                "simulated ledger is unreachable".to_string(),
            ));
        }
        Ok(())
    }

    async fn submit(&self, request: &TransactionRequest) -> Result<Submission, LedgerError> {
        if !self.config.submit_latency.is_zero() {
            tokio::time::sleep(self.config.submit_latency).await;
        }

        let (submission, confirmation) = self.record_submission(request)?;
        if !self.config.never_confirm {
            self.schedule_commit(submission.correlation_id().clone(), confirmation);
        }

        debug!(
            "Simulated submit {} -> {}",
            request.function,
            submission.correlation_id()
        );
        Ok(submission)
    }
}

#[async_trait]
impl ReceiptSource for SimulatedLedger {
    async fn get_outcome(&self, id: &CorrelationId) -> Result<ReceiptStatus, LedgerError> {
        Ok(self.poll_receipt(id))
    }
}

#[async_trait]
impl EventSource for SimulatedLedger {
    async fn subscribe(&self, topic: &EventTopic) -> Result<EventSubscription, LedgerError> {
        let batch_size = topic.batch_size.max(1);
        let (commit_tx, mut commit_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let handle = {
            let mut state = self.state.lock();
            state.next_subscription += 1;
            let id = format!("sim-sub-{}", state.next_subscription);
            state.subscribers.insert(id.clone(), commit_tx);
            SubscriptionHandle { id }
        };

        debug!(
            "Simulated subscription {} on {}/{} (batch size {})",
            handle.id, topic.channel, topic.chaincode, batch_size
        );

        // Batches are whatever is queued when the pump wakes, capped at
        // batch_size, so bursts of commits arrive together.
        tokio::spawn(async move {
            let mut queued = Vec::with_capacity(batch_size);
            while commit_rx.recv_many(&mut queued, batch_size).await > 0 {
                let mut batch = Vec::with_capacity(queued.len());
                for item in queued.drain(..) {
                    match item {
                        Ok(event) => batch.push(event),
                        Err(e) => {
                            if !batch.is_empty()
                                && batch_tx.send(Ok(std::mem::take(&mut batch))).await.is_err()
                            {
                                return;
                            }
                            if batch_tx.send(Err(e)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                if !batch.is_empty() && batch_tx.send(Ok(batch)).await.is_err() {
                    return;
                }
            }
        });

        Ok(EventSubscription {
            handle,
            events: batch_rx,
        })
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), LedgerError> {
        self.state.lock().subscribers.remove(&handle.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> TransactionRequest {
        ledger_core::Workload::new(ledger_core::WorkloadId::new(id))
            .to_request("default-channel", "asset_transfer")
    }

    #[tokio::test]
    async fn test_fail_every_nth_submission() {
        let ledger = SimulatedLedger::new(SimulatedConfig::instant().with_fail_every(3));

        let mut failures = 0;
        for i in 0..9 {
            if ledger.submit(&request(&format!("asset-{i}"))).await.is_err() {
                failures += 1;
            }
        }

        assert_eq!(failures, 3);
        assert_eq!(ledger.submissions(), 9);
    }

    #[tokio::test]
    async fn test_unreachable_refuses_connection() {
        let ledger = SimulatedLedger::new(SimulatedConfig::instant().unreachable());
        let err = ledger.connect().await.unwrap_err();
        assert!(matches!(err, LedgerError::Connection(_)));
    }

    #[tokio::test]
    async fn test_inline_confirmation() {
        let config = SimulatedConfig::instant()
            .with_inline_confirmation()
            .with_reported_elapsed(Duration::from_millis(12_500));
        let ledger = SimulatedLedger::new(config);

        match ledger.submit(&request("asset-1")).await.unwrap() {
            Submission::Confirmed { confirmation, .. } => {
                assert_eq!(
                    confirmation,
                    Confirmation::success().with_elapsed(Duration::from_millis(12_500))
                );
            }
            other => panic!("expected inline confirmation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_receipts_pending_then_resolved() {
        let ledger = SimulatedLedger::new(SimulatedConfig::instant().with_pending_polls(2));
        let submission = ledger.submit(&request("asset-1")).await.unwrap();
        let id = submission.correlation_id().clone();

        assert_eq!(ledger.get_outcome(&id).await.unwrap(), ReceiptStatus::Pending);
        assert_eq!(ledger.get_outcome(&id).await.unwrap(), ReceiptStatus::Pending);
        assert_eq!(ledger.unresolved_count(), 1);
        assert_eq!(
            ledger.get_outcome(&id).await.unwrap(),
            ReceiptStatus::Resolved(Confirmation::success())
        );
        assert_eq!(ledger.unresolved_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivered_commits_are_released() {
        let ledger = SimulatedLedger::new(SimulatedConfig::default());
        let topic = EventTopic {
            channel: "default-channel".to_string(),
            chaincode: "asset_transfer".to_string(),
            batch_size: 1,
        };
        let mut subscription = ledger.subscribe(&topic).await.unwrap();

        for i in 0..3 {
            ledger.submit(&request(&format!("asset-{i}"))).await.unwrap();
        }
        assert_eq!(ledger.unresolved_count(), 3);

        for _ in 0..3 {
            subscription.events.recv().await.unwrap().unwrap();
        }
        assert_eq!(ledger.unresolved_count(), 0);
    }

    #[tokio::test]
    async fn test_init_ledger_marks_initialized() {
        let ledger = SimulatedLedger::new(SimulatedConfig::instant());
        assert!(!ledger.is_initialized());
        ledger
            .initialize_ledger("default-channel", "asset_transfer")
            .await
            .unwrap();
        assert!(ledger.is_initialized());
    }
}
