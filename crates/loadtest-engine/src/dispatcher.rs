//! Worker pool that submits exactly `total` workloads with bounded concurrency.

use crate::config::DispatchStrategy;
use crate::error::EngineError;
use crate::partition::{describe_partitioning, partition_counts};
use ledger_client::LedgerClient;
use ledger_core::{SubmissionResult, Workload, WorkloadId};
use loadtest_generator::WorkloadGenerator;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Workload id reported for the ledger initialization transaction.
pub const INIT_WORKLOAD: &str = "InitLedger";

/// Produces the entropy source for each workload generator the pool creates.
pub type RngFactory = Arc<dyn Fn() -> Box<dyn RngCore + Send> + Send + Sync>;

/// What the pool did once every worker has exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Submit calls made, accepted or not.
    pub submitted: u64,
    /// Submit calls the backend rejected.
    pub rejected: u64,
    /// Submit calls made by each worker slot.
    pub per_worker: Vec<u64>,
}

impl PoolSummary {
    fn new(workers: usize) -> Self {
        Self {
            per_worker: vec![0; workers],
            ..Self::default()
        }
    }

    fn record(&mut self, worker: usize, rejected: bool) {
        self.submitted += 1;
        self.rejected += u64::from(rejected);
        if let Some(slot) = self.per_worker.get_mut(worker) {
            *slot += 1;
        }
    }
}

struct WorkerContext {
    client: Arc<dyn LedgerClient>,
    channel: String,
    chaincode: String,
}

impl WorkerContext {
    async fn submit(&self, worker: usize, workload: Workload) -> SubmissionResult {
        let request = workload.to_request(&self.channel, &self.chaincode);
        let started = Instant::now();
        let result = self.client.submit(&request).await;
        let round_trip = started.elapsed();

        if let Err(e) = &result {
            debug!(worker, "Submission of {} failed: {}", workload.id, e);
        }

        SubmissionResult {
            worker,
            workload_id: workload.id,
            round_trip,
            result,
        }
    }

    async fn initialize(&self) -> SubmissionResult {
        let started = Instant::now();
        let result = self
            .client
            .initialize_ledger(&self.channel, &self.chaincode)
            .await;

        SubmissionResult {
            worker: 0,
            workload_id: WorkloadId::new(INIT_WORKLOAD),
            round_trip: started.elapsed(),
            result,
        }
    }
}

/// Bounded pool of submission workers.
pub struct WorkerPool {
    context: Arc<WorkerContext>,
    rng_factory: RngFactory,
}

impl WorkerPool {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        channel: impl Into<String>,
        chaincode: impl Into<String>,
    ) -> Self {
        Self {
            context: Arc::new(WorkerContext {
                client,
                channel: channel.into(),
                chaincode: chaincode.into(),
            }),
            rng_factory: Arc::new(|| Box::new(OsRng) as Box<dyn RngCore + Send>),
        }
    }

    /// Replace the entropy source used for workload ids.
    pub fn with_rng_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn RngCore + Send> + Send + Sync + 'static,
    {
        self.rng_factory = Arc::new(factory);
        self
    }

    /// Start submitting. Each submission attempt yields exactly one
    /// [`SubmissionResult`] on the returned channel, which closes once every
    /// worker has exited.
    pub fn start(
        &self,
        strategy: DispatchStrategy,
        total: u64,
        workers: usize,
    ) -> (mpsc::Receiver<SubmissionResult>, PoolHandle) {
        let (results_tx, results_rx) = mpsc::channel(1);
        let context = Arc::clone(&self.context);
        let rng_factory = Arc::clone(&self.rng_factory);

        info!(
            "Starting {} workers ({}) for {} submissions",
            workers, strategy, total
        );

        let task = tokio::spawn(async move {
            match strategy {
                DispatchStrategy::Partitioned => {
                    run_partitioned(context, rng_factory, total, workers, results_tx).await
                }
                DispatchStrategy::Replenishing => {
                    run_replenishing(context, rng_factory, total, workers, results_tx).await
                }
            }
        });

        (results_rx, PoolHandle { task })
    }

    /// Submit the one-time ledger initialization transaction from a single
    /// worker.
    pub fn start_init(&self) -> (mpsc::Receiver<SubmissionResult>, PoolHandle) {
        let (results_tx, results_rx) = mpsc::channel(1);
        let context = Arc::clone(&self.context);

        info!(
            "Initializing ledger {}/{}",
            context.channel, context.chaincode
        );

        let task = tokio::spawn(async move {
            let result = context.initialize().await;
            let mut summary = PoolSummary::new(1);
            summary.record(0, result.result.is_err());
            if results_tx.send(result).await.is_err() {
                warn!("Result channel closed before initialization was reported");
            }
            Ok(summary)
        });

        (results_rx, PoolHandle { task })
    }
}

/// Handle to a running pool.
pub struct PoolHandle {
    task: JoinHandle<Result<PoolSummary, EngineError>>,
}

impl PoolHandle {
    /// Wait for every worker to exit.
    ///
    /// Fails if any worker hit a fatal error; the remaining workers are
    /// cancelled in that case.
    pub async fn wait(self) -> Result<PoolSummary, EngineError> {
        self.task.await?
    }

    /// Cancel every worker.
    pub fn abort(&self) {
        self.task.abort();
    }
}

struct WorkerStats {
    index: usize,
    submitted: u64,
    rejected: u64,
}

async fn run_partitioned(
    context: Arc<WorkerContext>,
    rng_factory: RngFactory,
    total: u64,
    workers: usize,
    results: mpsc::Sender<SubmissionResult>,
) -> Result<PoolSummary, EngineError> {
    let counts = partition_counts(total, workers);
    debug!("{}", describe_partitioning(&counts));

    let mut set = JoinSet::new();
    for (index, count) in counts.into_iter().enumerate() {
        let context = Arc::clone(&context);
        let results = results.clone();
        let generator = WorkloadGenerator::with_rng(rng_factory());
        set.spawn(run_worker(index, count, context, generator, results));
    }
    drop(results);

    let mut summary = PoolSummary::new(workers);
    // Dropping the set on an early return aborts the remaining workers.
    while let Some(joined) = set.join_next().await {
        let stats = joined??;
        summary.submitted += stats.submitted;
        summary.rejected += stats.rejected;
        summary.per_worker[stats.index] = stats.submitted;
    }

    info!(
        "All workers finished: {} submitted, {} rejected",
        summary.submitted, summary.rejected
    );
    Ok(summary)
}

async fn run_worker(
    index: usize,
    count: u64,
    context: Arc<WorkerContext>,
    mut generator: WorkloadGenerator<Box<dyn RngCore + Send>>,
    results: mpsc::Sender<SubmissionResult>,
) -> Result<WorkerStats, EngineError> {
    debug!(worker = index, "Worker starting with {} submissions", count);
    let mut stats = WorkerStats {
        index,
        submitted: 0,
        rejected: 0,
    };

    for _ in 0..count {
        let workload = generator.generate()?;
        let result = context.submit(index, workload).await;

        stats.submitted += 1;
        stats.rejected += u64::from(result.result.is_err());

        if results.send(result).await.is_err() {
            warn!(worker = index, "Result channel closed, stopping worker");
            break;
        }
    }

    debug!(
        worker = index,
        "Worker finished: {} submitted, {} rejected", stats.submitted, stats.rejected
    );
    Ok(stats)
}

struct SlotOutcome {
    slot: usize,
    rejected: bool,
    delivered: bool,
}

async fn run_replenishing(
    context: Arc<WorkerContext>,
    rng_factory: RngFactory,
    total: u64,
    workers: usize,
    results: mpsc::Sender<SubmissionResult>,
) -> Result<PoolSummary, EngineError> {
    let mut generator = WorkloadGenerator::with_rng(rng_factory());
    let mut set = JoinSet::new();
    let mut summary = PoolSummary::new(workers);
    let mut launched = 0u64;

    let mut launch = |set: &mut JoinSet<SlotOutcome>, slot: usize| -> Result<(), EngineError> {
        let workload = generator.generate()?;
        let context = Arc::clone(&context);
        let results = results.clone();
        set.spawn(async move {
            let result = context.submit(slot, workload).await;
            let rejected = result.result.is_err();
            let delivered = results.send(result).await.is_ok();
            SlotOutcome {
                slot,
                rejected,
                delivered,
            }
        });
        Ok(())
    };

    let window = (workers as u64).min(total) as usize;
    for slot in 0..window {
        launch(&mut set, slot)?;
        launched += 1;
    }

    while let Some(joined) = set.join_next().await {
        let finished = joined?;
        summary.record(finished.slot, finished.rejected);

        if !finished.delivered {
            warn!(worker = finished.slot, "Result channel closed, stopping pool");
            break;
        }
        if launched < total {
            launch(&mut set, finished.slot)?;
            launched += 1;
        }
    }

    info!(
        "All workers finished: {} submitted, {} rejected",
        summary.submitted, summary.rejected
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_client::{SimulatedConfig, SimulatedLedger};
    use std::collections::HashSet;

    fn pool(ledger: &SimulatedLedger) -> WorkerPool {
        WorkerPool::new(Arc::new(ledger.clone()), "default-channel", "asset_transfer")
    }

    async fn drain(mut rx: mpsc::Receiver<SubmissionResult>) -> Vec<SubmissionResult> {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }

    #[tokio::test]
    async fn test_partitioned_submits_exactly_total() {
        let ledger = SimulatedLedger::new(SimulatedConfig::instant());
        let (rx, handle) = pool(&ledger).start(DispatchStrategy::Partitioned, 10, 3);

        let results = drain(rx).await;
        let summary = handle.wait().await.unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(summary.submitted, 10);
        assert_eq!(summary.per_worker, vec![4, 3, 3]);
        assert_eq!(ledger.submissions(), 10);

        let ids: HashSet<_> = results.iter().map(|r| r.workload_id.clone()).collect();
        assert_eq!(ids.len(), 10);
    }

    #[tokio::test]
    async fn test_replenishing_submits_exactly_total() {
        let ledger = SimulatedLedger::new(SimulatedConfig::instant());
        let (rx, handle) = pool(&ledger).start(DispatchStrategy::Replenishing, 25, 4);

        let results = drain(rx).await;
        let summary = handle.wait().await.unwrap();

        assert_eq!(results.len(), 25);
        assert_eq!(summary.submitted, 25);
        assert_eq!(summary.per_worker.len(), 4);
        assert_eq!(ledger.submissions(), 25);
        assert!(results.iter().all(|r| r.worker < 4));
    }

    #[tokio::test]
    async fn test_submit_errors_do_not_stop_workers() {
        let ledger = SimulatedLedger::new(SimulatedConfig::instant().with_fail_every(3));
        let (rx, handle) = pool(&ledger).start(DispatchStrategy::Partitioned, 10, 3);

        let results = drain(rx).await;
        let summary = handle.wait().await.unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(results.iter().filter(|r| r.submit_error().is_some()).count(), 3);
        assert_eq!(summary.rejected, 3);
    }

    #[tokio::test]
    async fn test_start_init_submits_once() {
        let ledger = SimulatedLedger::new(SimulatedConfig::instant());
        let (rx, handle) = pool(&ledger).start_init();

        let results = drain(rx).await;
        let summary = handle.wait().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].workload_id.as_str(), INIT_WORKLOAD);
        assert_eq!(summary.submitted, 1);
        assert!(ledger.is_initialized());
    }

    #[tokio::test]
    async fn test_entropy_failure_is_fatal() {
        struct Exhausted;
        impl RngCore for Exhausted {
            fn next_u32(&mut self) -> u32 {
                0
            }
            fn next_u64(&mut self) -> u64 {
                0
            }
            fn fill_bytes(&mut self, dest: &mut [u8]) {
                dest.fill(0);
            }
            fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
                Err(rand::Error::new(std::io::Error::other("no entropy")))
            }
        }

        let ledger = SimulatedLedger::new(SimulatedConfig::instant());
        let pool = pool(&ledger).with_rng_factory(|| Box::new(Exhausted));
        let (rx, handle) = pool.start(DispatchStrategy::Partitioned, 5, 2);

        let results = drain(rx).await;
        let err = handle.wait().await.unwrap_err();

        assert!(results.is_empty());
        assert!(matches!(err, EngineError::Generator(_)));
        assert_eq!(ledger.submissions(), 0);
    }
}
