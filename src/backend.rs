//! Backend construction from command-line options.

use crate::settings::{mask_url_password, Settings};
use anyhow::Context;
use clap::{Args, ValueEnum};
use fabconnect_client::{
    CorrelateBy, FabconnectArgs, FabconnectClient, FabconnectEvents, SubmitHandle,
};
use ledger_client::{Backend, SimulatedConfig, SimulatedLedger, TrackingMode};
use loadtest_engine::{parse_duration, RunMode};
use std::sync::Arc;
use tracing::info;

/// Ledger backend implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackendKind {
    /// In-process simulated ledger
    #[default]
    Simulated,
    /// FabConnect REST gateway
    Fabconnect,
}

impl BackendKind {
    /// Tracking mode used when none is configured.
    pub fn default_tracking(&self) -> TrackingMode {
        match self {
            BackendKind::Simulated => TrackingMode::Events,
            BackendKind::Fabconnect => TrackingMode::Receipts,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Simulated => write!(f, "simulated"),
            BackendKind::Fabconnect => write!(f, "fabconnect"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulated" | "sim" | "dry-run" => Ok(BackendKind::Simulated),
            "fabconnect" | "fab-connect" | "gateway" => Ok(BackendKind::Fabconnect),
            _ => Err(format!("Unknown backend: {s}")),
        }
    }
}

/// Simulated ledger behaviour.
#[derive(Args, Clone, Debug)]
pub struct SimulatedArgs {
    /// Time a simulated submit call takes
    #[arg(long, default_value = "2ms")]
    pub sim_submit_latency: String,

    /// Time between acceptance and commit on the simulated ledger
    #[arg(long, default_value = "20ms")]
    pub sim_commit_latency: String,

    /// Reject every Nth submission
    #[arg(long)]
    pub sim_fail_every: Option<u64>,

    /// Commit every Nth accepted submission as a failed transaction
    #[arg(long)]
    pub sim_reject_every: Option<u64>,

    /// Receipt polls answered as pending before a receipt resolves
    #[arg(long, default_value = "0")]
    pub sim_pending_polls: u32,

    /// Deliver every commit event twice
    #[arg(long)]
    pub sim_duplicate_events: bool,

    /// Accept submissions but never commit them
    #[arg(long)]
    pub sim_never_confirm: bool,
}

impl SimulatedArgs {
    pub fn to_config(&self) -> anyhow::Result<SimulatedConfig> {
        let mut config = SimulatedConfig::default()
            .with_submit_latency(
                parse_duration(&self.sim_submit_latency).context("Invalid --sim-submit-latency")?,
            )
            .with_commit_latency(
                parse_duration(&self.sim_commit_latency).context("Invalid --sim-commit-latency")?,
            )
            .with_pending_polls(self.sim_pending_polls);

        if let Some(n) = self.sim_fail_every {
            config = config.with_fail_every(n);
        }
        if let Some(n) = self.sim_reject_every {
            config = config.with_reject_every(n);
        }
        if self.sim_duplicate_events {
            config = config.with_duplicate_events();
        }
        if self.sim_never_confirm {
            config = config.never_confirming();
        }
        Ok(config)
    }
}

/// Backend selection options.
#[derive(Args, Clone, Debug)]
pub struct BackendOpts {
    /// Ledger backend [default: simulated]
    #[arg(long, value_enum, env = "BACKEND")]
    pub backend: Option<BackendKind>,

    /// Outcome tracking: inline, events or receipts [default: events for
    /// simulated, receipts for fabconnect]
    #[arg(long, env = "TRACKING")]
    pub tracking: Option<TrackingMode>,

    #[command(flatten)]
    pub simulated: SimulatedArgs,

    #[command(flatten)]
    pub fabconnect: FabconnectArgs,
}

/// Build the backend selected by `settings`.
pub fn build_backend(settings: &Settings, opts: &BackendOpts) -> anyhow::Result<Backend> {
    match settings.backend {
        BackendKind::Simulated => {
            let mut config = opts.simulated.to_config()?;
            if settings.tracking == TrackingMode::Inline {
                config = config.with_inline_confirmation();
            }
            Ok(simulated_backend(
                SimulatedLedger::new(config),
                settings.tracking,
            ))
        }
        BackendKind::Fabconnect => fabconnect_backend(settings, &opts.fabconnect),
    }
}

/// Wrap a simulated ledger in the requested variant.
pub fn simulated_backend(ledger: SimulatedLedger, tracking: TrackingMode) -> Backend {
    let ledger = Arc::new(ledger);
    match tracking {
        TrackingMode::Inline => Backend::Direct {
            client: ledger,
            events: None,
        },
        TrackingMode::Events => Backend::Direct {
            client: ledger.clone(),
            events: Some(ledger),
        },
        TrackingMode::Receipts => Backend::Gateway {
            client: ledger.clone(),
            receipts: ledger,
        },
    }
}

fn fabconnect_backend(settings: &Settings, args: &FabconnectArgs) -> anyhow::Result<Backend> {
    let config = args.to_config(&settings.user);
    info!(
        "Using FabConnect gateway at {} as {}",
        mask_url_password(&config.base_url),
        settings.user
    );

    let client = FabconnectClient::new(config).context("Failed to build FabConnect client")?;
    let backend = match settings.tracking {
        TrackingMode::Receipts => {
            let client = Arc::new(client);
            Backend::Gateway {
                client: client.clone(),
                receipts: client,
            }
        }
        TrackingMode::Events => {
            // Chaincode events carry the asset id, not the receipt id.
            let client = client.with_submit_handle(SubmitHandle::AssetId);
            let events =
                FabconnectEvents::new(client.clone()).with_correlation(CorrelateBy::AssetId);
            Backend::Direct {
                client: Arc::new(client),
                events: Some(Arc::new(events)),
            }
        }
        TrackingMode::Inline => Backend::Direct {
            client: Arc::new(client),
            events: None,
        },
    };
    Ok(backend)
}

/// Resolve the tracking mode for a run.
///
/// `InitLedger` emits no asset event, so FabConnect init runs always poll
/// receipts.
pub fn resolve_tracking(
    backend: BackendKind,
    requested: Option<TrackingMode>,
    mode: RunMode,
) -> TrackingMode {
    let tracking = requested.unwrap_or_else(|| backend.default_tracking());
    if mode == RunMode::Init
        && backend == BackendKind::Fabconnect
        && tracking == TrackingMode::Events
    {
        info!("Ledger initialization is tracked through receipts");
        return TrackingMode::Receipts;
    }
    tracking
}
