//! Backend variant selection.

use crate::client::{EventSource, LedgerClient, ReceiptSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the eventual outcome of a submission is learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// The submit call itself is the commit confirmation.
    Inline,
    /// A long-lived event stream pushes commit notifications.
    Events,
    /// Receipts are polled on a fixed interval.
    Receipts,
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingMode::Inline => write!(f, "inline"),
            TrackingMode::Events => write!(f, "events"),
            TrackingMode::Receipts => write!(f, "receipts"),
        }
    }
}

impl std::str::FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inline" | "sync" => Ok(TrackingMode::Inline),
            "events" | "event" | "push" => Ok(TrackingMode::Events),
            "receipts" | "receipt" | "poll" => Ok(TrackingMode::Receipts),
            _ => Err(format!("Unknown tracking mode: {s}")),
        }
    }
}

/// A ledger backend with exactly one outcome-correlation capability.
#[derive(Clone)]
pub enum Backend {
    /// Submissions return a definitive transaction id. Commits arrive on
    /// `events`; without an event source each submit confirms inline.
    Direct {
        client: Arc<dyn LedgerClient>,
        events: Option<Arc<dyn EventSource>>,
    },
    /// Submissions return a receipt handle that must be polled.
    Gateway {
        client: Arc<dyn LedgerClient>,
        receipts: Arc<dyn ReceiptSource>,
    },
}

impl Backend {
    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        match self {
            Backend::Direct { client, .. } => client,
            Backend::Gateway { client, .. } => client,
        }
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        match self {
            Backend::Direct { events: None, .. } => TrackingMode::Inline,
            Backend::Direct { events: Some(_), .. } => TrackingMode::Events,
            Backend::Gateway { .. } => TrackingMode::Receipts,
        }
    }

    pub fn name(&self) -> &str {
        self.client().name()
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("client", &self.name())
            .field("tracking", &self.tracking_mode())
            .finish()
    }
}
