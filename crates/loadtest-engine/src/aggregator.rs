//! Thread-safe outcome tally.

use crate::report::{throughput, Diagnostics, Report, RunDescription};
use chrono::Utc;
use ledger_core::{Outcome, OutcomeStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Distinct error messages kept for the report.
const MAX_ERROR_SAMPLES: usize = 5;

#[derive(Debug, Default)]
struct Tally {
    successes: u64,
    failures: u64,
    timeouts: u64,
    max_elapsed: Duration,
    total_elapsed: Duration,
    error_samples: Vec<String>,
}

/// Accumulates outcomes as they arrive.
///
/// Cloning yields another handle to the same tally. The lock is never held
/// across an await point or while taking another lock.
#[derive(Debug, Clone)]
pub struct Aggregator {
    run: Arc<RunDescription>,
    tally: Arc<Mutex<Tally>>,
}

impl Aggregator {
    pub fn new(run: RunDescription) -> Self {
        Self {
            run: Arc::new(run),
            tally: Arc::new(Mutex::new(Tally::default())),
        }
    }

    pub fn record(&self, outcome: &Outcome) {
        let mut tally = self.tally.lock();
        match outcome.status {
            OutcomeStatus::Success => tally.successes += 1,
            OutcomeStatus::Failure => tally.failures += 1,
            OutcomeStatus::Timeout => tally.timeouts += 1,
        }
        tally.max_elapsed = tally.max_elapsed.max(outcome.elapsed);
        tally.total_elapsed += outcome.elapsed;

        if let Some(error) = &outcome.error {
            if tally.error_samples.len() < MAX_ERROR_SAMPLES && !tally.error_samples.contains(error)
            {
                tally.error_samples.push(error.clone());
            }
        }
    }

    /// Outcomes recorded so far.
    pub fn recorded(&self) -> u64 {
        let tally = self.tally.lock();
        tally.successes + tally.failures + tally.timeouts
    }

    /// Build the report for a run that took `runtime`.
    pub fn snapshot(&self, runtime: Duration) -> Report {
        let tally = self.tally.lock();
        let recorded = tally.successes + tally.failures + tally.timeouts;
        let runtime_secs = runtime.as_secs_f64();
        let mean_elapsed_secs = if recorded > 0 {
            tally.total_elapsed.as_secs_f64() / recorded as f64
        } else {
            0.0
        };

        Report {
            run: (*self.run).clone(),
            runtime_secs,
            successes: tally.successes,
            failures: tally.failures,
            timeouts: tally.timeouts,
            max_elapsed_secs: tally.max_elapsed.as_secs_f64(),
            mean_elapsed_secs,
            throughput: throughput(self.run.total_transactions, runtime_secs),
            error_samples: tally.error_samples.clone(),
            diagnostics: Diagnostics::default(),
            generated_at: Utc::now(),
        }
    }
}
