//! fabric-loadtest library
//!
//! Load driver for permissioned ledgers. A run submits a fixed number of
//! generated `CreateAsset` transactions through a bounded pool of workers,
//! tracks every one of them to a definitive outcome, and reports throughput
//! and latency.
//!
//! # Backends
//!
//! - `simulated` - an in-process ledger for dry runs
//! - `fabconnect` - a FabConnect REST gateway, tracked through polled
//!   receipts or a websocket event stream
//!
//! # CLI Usage
//!
//! ```bash
//! # 5000 transactions over 50 workers against a FabConnect gateway
//! fabric-loadtest run --backend fabconnect --tx-count 5000 --workers 50
//!
//! # Same, tracked through chaincode events
//! TRACKING=events fabric-loadtest run --backend fabconnect -n 5000 -w 50
//!
//! # One-time ledger initialization
//! fabric-loadtest init --backend fabconnect
//!
//! # Re-render a saved report
//! fabric-loadtest report --input report.json --format table
//! ```

pub mod backend;
pub mod settings;

pub use backend::{build_backend, BackendKind, BackendOpts, SimulatedArgs};
pub use settings::{mask_url_password, RunOpts, Settings};

use anyhow::Context;
use loadtest_engine::{LoadTestRun, Report, RunMode};
use tracing::info;

/// Resolve `opts`, run the load test and save the report if requested.
pub async fn execute(opts: &RunOpts, mode: RunMode) -> anyhow::Result<Report> {
    let profile = opts.profile()?;
    let settings = Settings::resolve(opts, &profile, mode)?;
    info!(
        "Starting {} run: {} transactions, {} workers, {} backend ({} tracking)",
        settings.config.mode,
        settings.config.tx_count,
        settings.config.workers,
        settings.backend,
        settings.tracking
    );

    let backend = build_backend(&settings, &opts.backend)?;
    let report = LoadTestRun::new(backend, settings.config)
        .run()
        .await
        .context("Load test run failed")?;

    if let Some(path) = &opts.output {
        report
            .save(path)
            .with_context(|| format!("Failed to write report to {path:?}"))?;
        info!("Report written to {}", path.display());
    }
    Ok(report)
}
