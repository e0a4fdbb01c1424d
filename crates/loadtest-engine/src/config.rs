//! Run configuration.

use crate::error::EngineError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Hard cap on concurrent workers.
pub const MAX_WORKERS: usize = 512;

pub const DEFAULT_CHANNEL: &str = "default-channel";
pub const DEFAULT_CHAINCODE: &str = "asset_transfer";
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_EVENT_BATCH_SIZE: usize = 1;
pub const DEFAULT_MAX_IDLE_SWEEPS: u32 = 12;

/// How submissions are spread over workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStrategy {
    /// Each worker owns a fixed share computed up front.
    #[default]
    Partitioned,
    /// A fixed window of in-flight submissions, refilled as each one returns.
    Replenishing,
}

impl std::fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStrategy::Partitioned => write!(f, "partitioned"),
            DispatchStrategy::Replenishing => write!(f, "replenishing"),
        }
    }
}

impl std::str::FromStr for DispatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "partitioned" | "partition" | "static" => Ok(DispatchStrategy::Partitioned),
            "replenishing" | "window" | "dynamic" => Ok(DispatchStrategy::Replenishing),
            _ => Err(format!("Unknown dispatch strategy: {s}")),
        }
    }
}

/// Bulk load or one-time ledger initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Load,
    Init,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Load => write!(f, "load"),
            RunMode::Init => write!(f, "init"),
        }
    }
}

/// Validated inputs of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub tx_count: u64,
    pub workers: usize,
    pub mode: RunMode,
    pub dispatch: DispatchStrategy,
    pub channel: String,
    pub chaincode: String,
    /// Per-item window before an unconfirmed submission times out.
    pub tx_timeout: Duration,
    /// Receipt polling cadence.
    pub poll_interval: Duration,
    /// Timeout sweep cadence.
    pub sweep_interval: Duration,
    pub event_batch_size: usize,
    /// Consecutive poll sweeps without progress before giving up on the rest.
    pub max_idle_sweeps: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tx_count: 1,
            workers: 1,
            mode: RunMode::Load,
            dispatch: DispatchStrategy::Partitioned,
            channel: DEFAULT_CHANNEL.to_string(),
            chaincode: DEFAULT_CHAINCODE.to_string(),
            tx_timeout: DEFAULT_TX_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            event_batch_size: DEFAULT_EVENT_BATCH_SIZE,
            max_idle_sweeps: DEFAULT_MAX_IDLE_SWEEPS,
        }
    }
}

impl RunConfig {
    pub fn new(tx_count: u64, workers: usize) -> Self {
        Self {
            tx_count,
            workers,
            ..Self::default()
        }
    }

    /// A one-transaction initialization run.
    pub fn init() -> Self {
        Self {
            mode: RunMode::Init,
            ..Self::default()
        }
    }

    pub fn with_dispatch(mut self, dispatch: DispatchStrategy) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_target(mut self, channel: impl Into<String>, chaincode: impl Into<String>) -> Self {
        self.channel = channel.into();
        self.chaincode = chaincode.into();
        self
    }

    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_event_batch_size(mut self, batch_size: usize) -> Self {
        self.event_batch_size = batch_size;
        self
    }

    pub fn with_max_idle_sweeps(mut self, sweeps: u32) -> Self {
        self.max_idle_sweeps = sweeps;
        self
    }

    /// Reject configurations the engine will not attempt to run.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::Precondition(msg));

        if self.mode == RunMode::Init {
            if self.tx_count != 1 || self.workers != 1 {
                return fail("init mode submits exactly one transaction with one worker".into());
            }
        } else {
            if self.tx_count == 0 {
                return fail("transaction count must be at least 1".into());
            }
            if self.workers == 0 {
                return fail("worker count must be at least 1".into());
            }
            if self.workers > MAX_WORKERS {
                return fail(format!(
                    "worker count {} exceeds the maximum of {MAX_WORKERS}",
                    self.workers
                ));
            }
            if self.workers as u64 > self.tx_count {
                return fail(format!(
                    "worker count {} exceeds transaction count {}",
                    self.workers, self.tx_count
                ));
            }
        }
        if self.channel.is_empty() || self.chaincode.is_empty() {
            return fail("channel and chaincode must be set".into());
        }
        if self.tx_timeout.is_zero() || self.poll_interval.is_zero() || self.sweep_interval.is_zero() {
            return fail("timeout, poll and sweep intervals must be non-zero".into());
        }
        if self.event_batch_size == 0 {
            return fail("event batch size must be at least 1".into());
        }
        if self.max_idle_sweeps == 0 {
            return fail("idle sweep limit must be at least 1".into());
        }
        Ok(())
    }
}

/// Parse a duration such as `90`, `90s`, `5m`, `1h` or `250ms`.
///
/// A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, EngineError> {
    let s = s.trim();
    let invalid = || EngineError::Duration(s.to_string());

    let (num_str, unit_ms) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, 1)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 3_600_000)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60_000)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1_000)
    } else {
        (s, 1_000)
    };

    let num: u64 = num_str.trim().parse().map_err(|_| invalid())?;
    let millis = num.checked_mul(unit_ms).ok_or_else(invalid)?;
    Ok(Duration::from_millis(millis))
}

/// Optional YAML run profile. Every field may be overridden on the command line.
///
/// ```yaml
/// tx_count: 5000
/// workers: 50
/// dispatch: replenishing
/// chaincode: asset_transfer
/// tx_timeout: 2m
/// poll_interval: 5s
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunProfile {
    pub tx_count: Option<u64>,
    pub workers: Option<usize>,
    pub dispatch: Option<DispatchStrategy>,
    pub channel: Option<String>,
    pub chaincode: Option<String>,
    pub user: Option<String>,
    pub backend: Option<String>,
    pub tracking: Option<String>,
    pub tx_timeout: Option<String>,
    pub poll_interval: Option<String>,
    pub event_batch_size: Option<usize>,
    pub max_idle_sweeps: Option<u32>,
}

impl RunProfile {
    pub fn from_yaml(content: &str) -> Result<Self, EngineError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
