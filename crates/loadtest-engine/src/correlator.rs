//! Outcome correlation.
//!
//! The correlator is the single owner of the pending-submission map. It
//! consumes submission results from the worker pool and confirmations from
//! exactly one tracking source, and resolves every requested workload to
//! exactly one [`Outcome`]:
//!
//! ```text
//!   SubmissionResult ──► register ──► pending ──┬─► confirmed / failed  (event or receipt)
//!                                               └─► timed out           (sweep)
//! ```
//!
//! Confirmations for correlation ids that are not registered yet are held
//! until the matching submission result arrives, so a fast commit can never
//! be lost to the race between the submit call returning and the result
//! reaching the correlator.

use crate::aggregator::Aggregator;
use crate::config::RunConfig;
use ledger_client::ReceiptSource;
use ledger_core::{
    CommitEvent, Confirmation, CorrelationId, LedgerError, Outcome, OutcomeStatus, ReceiptStatus,
    Submission, SubmissionResult, WorkloadId,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Batches of commit notifications, or a payload that failed to decode.
pub type EventBatches = mpsc::Receiver<Result<Vec<CommitEvent>, LedgerError>>;

/// Global run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Submissions are still being dispatched.
    Running,
    /// Every submission has been made; outcomes are outstanding.
    Draining,
    /// Every requested workload has an outcome.
    Complete,
}

/// Where confirmations come from.
pub enum Tracking {
    /// The submit call itself confirms.
    Inline,
    /// A commit notification stream.
    Events(EventBatches),
    /// Receipts polled on the configured interval.
    Receipts(Arc<dyn ReceiptSource>),
}

/// Timing knobs of the correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatorSettings {
    pub tx_timeout: Duration,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    pub max_idle_sweeps: u32,
}

impl From<&RunConfig> for CorrelatorSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            tx_timeout: config.tx_timeout,
            poll_interval: config.poll_interval,
            sweep_interval: config.sweep_interval,
            max_idle_sweeps: config.max_idle_sweeps,
        }
    }
}

impl Default for CorrelatorSettings {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

/// Counters describing how correlation went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    pub requested: u64,
    pub completed: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    /// Confirmations discarded because their id was already resolved.
    pub duplicates: u64,
    /// Confirmations that never matched a submission.
    pub unmatched: u64,
    /// Payloads that could not be decoded.
    pub malformed: u64,
    /// Receipt lookups that failed in transit.
    pub query_errors: u64,
    pub poll_sweeps: u32,
    /// Poll sweeps that resolved nothing.
    pub idle_sweeps: u32,
}

impl CorrelationSummary {
    pub fn is_complete(&self) -> bool {
        self.completed == self.requested
    }
}

struct Tracked {
    workload_id: WorkloadId,
    submitted_at: Instant,
}

/// Single-owner correlation state.
struct Book {
    requested: u64,
    inline: bool,
    tx_timeout: Duration,
    max_idle_sweeps: u32,
    pending: HashMap<CorrelationId, Tracked>,
    early: HashMap<CorrelationId, (Confirmation, Instant)>,
    resolved: HashSet<CorrelationId>,
    received: u64,
    dispatch_closed: bool,
    consecutive_idle: u32,
    summary: CorrelationSummary,
    aggregator: Aggregator,
    state: watch::Sender<RunState>,
}

impl Book {
    fn is_complete(&self) -> bool {
        self.summary.is_complete()
    }

    fn is_draining(&self) -> bool {
        self.dispatch_closed || self.received >= self.requested
    }

    fn finish(&mut self, outcome: Outcome) {
        self.aggregator.record(&outcome);
        self.summary.completed += 1;
        match outcome.status {
            OutcomeStatus::Success => self.summary.successes += 1,
            OutcomeStatus::Failure => self.summary.failures += 1,
            OutcomeStatus::Timeout => self.summary.timeouts += 1,
        }

        if self.is_complete() {
            info!("All {} outcomes resolved", self.requested);
            self.state.send_replace(RunState::Complete);
        }
    }

    /// Outcome for a submission whose correlation id was already used.
    fn reused_id(&mut self, workload_id: WorkloadId, id: &CorrelationId, elapsed: Duration) {
        warn!("Correlation id {} reused by the backend", id);
        let err = LedgerError::Protocol(format!("correlation id {id} reused"));
        self.finish(Outcome::submit_failed(workload_id, &err, elapsed));
    }

    fn finish_direct(
        &mut self,
        workload_id: WorkloadId,
        id: CorrelationId,
        confirmation: Confirmation,
        round_trip: Duration,
    ) {
        if !self.resolved.insert(id.clone()) {
            self.reused_id(workload_id, &id, round_trip);
            return;
        }
        self.finish(Outcome::resolved(workload_id, id, confirmation, round_trip));
    }

    fn register(&mut self, workload_id: WorkloadId, id: CorrelationId, submitted_at: Instant) {
        if self.resolved.contains(&id) || self.pending.contains_key(&id) {
            self.reused_id(workload_id, &id, submitted_at.elapsed());
            return;
        }

        if let Some((confirmation, _)) = self.early.remove(&id) {
            debug!("Matched buffered confirmation for {}", id);
            self.resolved.insert(id.clone());
            let measured = submitted_at.elapsed();
            self.finish(Outcome::resolved(workload_id, id, confirmation, measured));
            return;
        }

        self.pending.insert(
            id,
            Tracked {
                workload_id,
                submitted_at,
            },
        );
    }

    fn on_submission(&mut self, result: SubmissionResult) {
        self.received += 1;
        let SubmissionResult {
            workload_id,
            round_trip,
            result,
            ..
        } = result;
        let now = Instant::now();
        let submitted_at = now.checked_sub(round_trip).unwrap_or(now);

        match result {
            Err(e) => self.finish(Outcome::submit_failed(workload_id, &e, round_trip)),
            Ok(Submission::Confirmed { id, confirmation }) => {
                self.finish_direct(workload_id, id, confirmation, round_trip)
            }
            Ok(Submission::Accepted(id)) if self.inline => {
                self.finish_direct(workload_id, id, Confirmation::success(), round_trip)
            }
            Ok(Submission::Accepted(id)) => self.register(workload_id, id, submitted_at),
        }

        if self.received == self.requested && !self.is_complete() {
            debug!(
                "All {} submissions made, {} outcomes pending",
                self.requested,
                self.pending.len()
            );
            self.state.send_replace(RunState::Draining);
        }
    }

    fn on_dispatch_closed(&mut self) {
        self.dispatch_closed = true;
        if self.received < self.requested {
            warn!(
                "Worker pool stopped after {}/{} submissions",
                self.received, self.requested
            );
        }
        if !self.early.is_empty() {
            warn!(
                "Discarding {} confirmations that matched no submission",
                self.early.len()
            );
            self.summary.unmatched += self.early.len() as u64;
            self.early.clear();
        }
    }

    /// Resolve a pending item. Returns false if the id is not pending.
    fn resolve(&mut self, id: &CorrelationId, confirmation: Confirmation) -> bool {
        let Some(tracked) = self.pending.remove(id) else {
            return false;
        };
        self.resolved.insert(id.clone());
        let measured = tracked.submitted_at.elapsed();
        self.finish(Outcome::resolved(
            tracked.workload_id,
            id.clone(),
            confirmation,
            measured,
        ));
        true
    }

    fn on_commit(&mut self, event: CommitEvent) {
        let id = event.correlation_id;
        if self.resolve(&id, event.confirmation) {
            return;
        }

        if self.resolved.contains(&id) || self.early.contains_key(&id) {
            self.summary.duplicates += 1;
            warn!("Duplicate confirmation for {} discarded", id);
        } else if self.dispatch_closed {
            self.summary.unmatched += 1;
            warn!("Confirmation for unknown correlation id {} discarded", id);
        } else {
            debug!("Buffering confirmation for unregistered {}", id);
            self.early.insert(id, (event.confirmation, Instant::now()));
        }
    }

    fn on_malformed(&mut self, err: LedgerError) {
        self.summary.malformed += 1;
        warn!("Ignoring undecodable confirmation payload: {}", err);
    }

    async fn poll_receipts(&mut self, source: &dyn ReceiptSource) {
        if self.pending.is_empty() {
            return;
        }

        let ids: Vec<CorrelationId> = self.pending.keys().cloned().collect();
        let results = source.get_outcomes(&ids).await;
        self.summary.poll_sweeps += 1;

        let mut resolved = 0usize;
        for (id, result) in results {
            match result {
                Ok(ReceiptStatus::Resolved(confirmation)) => {
                    if self.resolve(&id, confirmation) {
                        resolved += 1;
                    }
                }
                Ok(ReceiptStatus::Pending) => {}
                Err(e) => {
                    self.summary.query_errors += 1;
                    debug!("Receipt lookup for {} failed: {}", id, e);
                }
            }
        }

        if resolved > 0 {
            debug!(
                "Poll sweep resolved {}/{} receipts",
                resolved,
                ids.len()
            );
            self.consecutive_idle = 0;
            return;
        }

        self.summary.idle_sweeps += 1;
        // The give-up only counts once every submission is in; items still
        // arriving are covered by their own timeout.
        if !self.is_draining() {
            self.consecutive_idle = 0;
            debug!("Idle poll sweep ({} pending, dispatch running)", self.pending.len());
            return;
        }
        self.consecutive_idle += 1;
        debug!(
            "Idle poll sweep {} ({} pending)",
            self.consecutive_idle,
            self.pending.len()
        );

        if self.consecutive_idle >= self.max_idle_sweeps {
            warn!(
                "No receipt progress in {} sweeps, timing out {} pending submissions",
                self.consecutive_idle,
                self.pending.len()
            );
            let ids: Vec<CorrelationId> = self.pending.keys().cloned().collect();
            let now = Instant::now();
            for id in ids {
                self.expire(&id, now);
            }
            self.consecutive_idle = 0;
        }
    }

    fn expire(&mut self, id: &CorrelationId, now: Instant) {
        if let Some(tracked) = self.pending.remove(id) {
            self.resolved.insert(id.clone());
            let waited = now.duration_since(tracked.submitted_at);
            self.finish(Outcome::timed_out(tracked.workload_id, id.clone(), waited));
        }
    }

    fn sweep_timeouts(&mut self, now: Instant) {
        let expired: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|(_, tracked)| now.duration_since(tracked.submitted_at) >= self.tx_timeout)
            .map(|(id, _)| id.clone())
            .collect();

        if !expired.is_empty() {
            warn!(
                "{} submissions timed out after {:?}",
                expired.len(),
                self.tx_timeout
            );
            for id in &expired {
                self.expire(id, now);
            }
        }

        let before = self.early.len();
        let window = self.tx_timeout;
        self.early
            .retain(|_, (_, seen)| now.duration_since(*seen) < window);
        let dropped = before - self.early.len();
        if dropped > 0 {
            self.summary.unmatched += dropped as u64;
            warn!("Discarded {} confirmations that matched no submission", dropped);
        }
    }
}

/// Resolves submissions to outcomes.
pub struct Correlator {
    book: Book,
    settings: CorrelatorSettings,
    submissions: mpsc::Receiver<SubmissionResult>,
    tracking: Tracking,
}

impl Correlator {
    pub fn new(
        requested: u64,
        submissions: mpsc::Receiver<SubmissionResult>,
        tracking: Tracking,
        aggregator: Aggregator,
        settings: CorrelatorSettings,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Running);
        let book = Book {
            requested,
            inline: matches!(tracking, Tracking::Inline),
            tx_timeout: settings.tx_timeout,
            max_idle_sweeps: settings.max_idle_sweeps,
            pending: HashMap::new(),
            early: HashMap::new(),
            resolved: HashSet::new(),
            received: 0,
            dispatch_closed: false,
            consecutive_idle: 0,
            summary: CorrelationSummary {
                requested,
                ..CorrelationSummary::default()
            },
            aggregator,
            state,
        };

        Self {
            book,
            settings,
            submissions,
            tracking,
        }
    }

    /// Observe the run state.
    pub fn state(&self) -> watch::Receiver<RunState> {
        self.book.state.subscribe()
    }

    /// Correlate until every requested workload has an outcome, or until the
    /// worker pool stops early and nothing is left pending.
    pub async fn run(self) -> CorrelationSummary {
        let Correlator {
            mut book,
            settings,
            mut submissions,
            tracking,
        } = self;

        let (mut events, receipts) = match tracking {
            Tracking::Inline => (None, None),
            Tracking::Events(rx) => (Some(rx), None),
            Tracking::Receipts(source) => (None, Some(source)),
        };

        let start = Instant::now();
        let mut sweep = interval_at(start + settings.sweep_interval, settings.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = interval_at(start + settings.poll_interval, settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut dispatch_open = true;

        while !book.is_complete() {
            if book.dispatch_closed && book.pending.is_empty() {
                warn!(
                    "Correlation stopped with {}/{} outcomes",
                    book.summary.completed, book.requested
                );
                break;
            }

            tokio::select! {
                result = submissions.recv(), if dispatch_open => match result {
                    Some(result) => book.on_submission(result),
                    None => {
                        dispatch_open = false;
                        book.on_dispatch_closed();
                    }
                },
                batch = next_batch(&mut events), if events.is_some() => match batch {
                    Some(Ok(batch)) => {
                        for event in batch {
                            book.on_commit(event);
                        }
                    }
                    Some(Err(e)) => book.on_malformed(e),
                    None => {
                        warn!(
                            "Event stream closed with {} outcomes pending",
                            book.pending.len()
                        );
                        events = None;
                    }
                },
                _ = poll.tick(), if receipts.is_some() => {
                    if let Some(source) = &receipts {
                        book.poll_receipts(source.as_ref()).await;
                    }
                },
                _ = sweep.tick() => book.sweep_timeouts(Instant::now()),
            }
        }

        book.summary
    }
}

async fn next_batch(
    events: &mut Option<EventBatches>,
) -> Option<Result<Vec<CommitEvent>, LedgerError>> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
