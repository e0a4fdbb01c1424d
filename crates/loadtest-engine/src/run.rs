//! One end-to-end load test run.

use crate::aggregator::Aggregator;
use crate::config::{RunConfig, RunMode};
use crate::correlator::{CorrelationSummary, Correlator, CorrelatorSettings, Tracking};
use crate::dispatcher::{PoolSummary, RngFactory, WorkerPool};
use crate::error::EngineError;
use crate::report::{Diagnostics, Report, RunDescription};
use ledger_client::{Backend, EventSource, EventTopic, SubscriptionHandle};
use rand::RngCore;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Drives a [`Backend`] through one run and produces the final [`Report`].
///
/// The run connects, subscribes to commit events when the backend streams
/// them, dispatches every workload, waits for every outcome and tears the
/// subscription and session down again, on success and on failure alike.
pub struct LoadTestRun {
    backend: Backend,
    config: RunConfig,
    pool_rng: Option<RngFactory>,
}

impl LoadTestRun {
    pub fn new(backend: Backend, config: RunConfig) -> Self {
        Self {
            backend,
            config,
            pool_rng: None,
        }
    }

    /// Replace the entropy source used for workload ids.
    pub fn with_rng_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn RngCore + Send> + Send + Sync + 'static,
    {
        self.pool_rng = Some(Arc::new(factory));
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The configuration block echoed in the report.
    pub fn description(&self) -> RunDescription {
        RunDescription {
            mode: self.config.mode,
            total_transactions: self.config.tx_count,
            workers: self.config.workers,
            event_batch_size: self.config.event_batch_size,
            backend: self.backend.name().to_string(),
            tracking: self.backend.tracking_mode(),
            dispatch: self.config.dispatch,
        }
    }

    pub async fn run(self) -> Result<Report, EngineError> {
        self.config.validate()?;
        let started = Instant::now();
        let client = Arc::clone(self.backend.client());

        info!(
            "Connecting to {} backend ({} tracking)",
            self.backend.name(),
            self.backend.tracking_mode()
        );
        client.connect().await?;

        let result = self.execute(started).await;

        if let Err(e) = client.close().await {
            warn!("Failed to close {} backend: {}", self.backend.name(), e);
        }
        result
    }

    async fn execute(&self, started: Instant) -> Result<Report, EngineError> {
        // Subscribe before the first submit so no commit can be missed.
        let (tracking, subscription) = self.start_tracking().await?;

        let aggregator = Aggregator::new(self.description());
        let pool = self.pool();
        let (results, pool_handle) = match self.config.mode {
            RunMode::Load => pool.start(
                self.config.dispatch,
                self.config.tx_count,
                self.config.workers,
            ),
            RunMode::Init => pool.start_init(),
        };

        let correlator = Correlator::new(
            self.config.tx_count,
            results,
            tracking,
            aggregator.clone(),
            CorrelatorSettings::from(&self.config),
        );
        let correlation = tokio::spawn(correlator.run());

        let outcome = match pool_handle.wait().await {
            Ok(pool_summary) => match correlation.await {
                Ok(summary) => Ok((pool_summary, summary)),
                Err(e) => Err(EngineError::from(e)),
            },
            Err(e) => {
                correlation.abort();
                Err(e)
            }
        };
        let runtime = started.elapsed();

        if let Some((source, handle)) = subscription {
            teardown(source.as_ref(), &handle).await;
        }

        let (pool_summary, summary) = outcome?;
        if !summary.is_complete() {
            return Err(EngineError::Incomplete {
                completed: summary.completed,
                requested: summary.requested,
            });
        }

        let mut report = aggregator.snapshot(runtime);
        report.diagnostics = diagnostics(&pool_summary, &summary);
        info!(
            "Run complete in {:.3}s: {} succeeded, {} failed, {} timed out",
            report.runtime_secs, report.successes, report.failures, report.timeouts
        );
        Ok(report)
    }

    fn pool(&self) -> WorkerPool {
        let pool = WorkerPool::new(
            Arc::clone(self.backend.client()),
            self.config.channel.clone(),
            self.config.chaincode.clone(),
        );
        match &self.pool_rng {
            Some(factory) => {
                let factory = Arc::clone(factory);
                pool.with_rng_factory(move || factory())
            }
            None => pool,
        }
    }

    async fn start_tracking(
        &self,
    ) -> Result<(Tracking, Option<(Arc<dyn EventSource>, SubscriptionHandle)>), EngineError> {
        match &self.backend {
            Backend::Direct { events: None, .. } => Ok((Tracking::Inline, None)),
            Backend::Direct {
                events: Some(source),
                ..
            } => {
                let topic = EventTopic {
                    channel: self.config.channel.clone(),
                    chaincode: self.config.chaincode.clone(),
                    batch_size: self.config.event_batch_size,
                };
                let subscription = source.subscribe(&topic).await?;
                info!(
                    "Subscribed to commit events on {}/{} ({})",
                    topic.channel, topic.chaincode, subscription.handle.id
                );
                Ok((
                    Tracking::Events(subscription.events),
                    Some((Arc::clone(source), subscription.handle)),
                ))
            }
            Backend::Gateway { receipts, .. } => {
                Ok((Tracking::Receipts(Arc::clone(receipts)), None))
            }
        }
    }
}

async fn teardown(source: &dyn EventSource, handle: &SubscriptionHandle) {
    match source.unsubscribe(handle).await {
        Ok(()) => debug!("Removed event subscription {}", handle.id),
        Err(e) => warn!("Failed to remove event subscription {}: {}", handle.id, e),
    }
}

fn diagnostics(pool: &PoolSummary, correlation: &CorrelationSummary) -> Diagnostics {
    Diagnostics {
        submitted: pool.submitted,
        rejected: pool.rejected,
        duplicates: correlation.duplicates,
        unmatched: correlation.unmatched,
        malformed: correlation.malformed,
        query_errors: correlation.query_errors,
        poll_sweeps: correlation.poll_sweeps,
        idle_sweeps: correlation.idle_sweeps,
    }
}
