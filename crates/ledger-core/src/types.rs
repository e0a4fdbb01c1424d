//! Identifier and request types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chaincode function invoked for every load workload.
pub const CREATE_ASSET_FN: &str = "CreateAsset";

/// Chaincode function invoked by the one-time ledger initialization.
pub const INIT_LEDGER_FN: &str = "InitLedger";

/// Unique identifier of one unit of work (the asset id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadId(String);

impl WorkloadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-issued handle used to match an asynchronous outcome to its
/// originating submission (a transaction id or a receipt id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One simulated asset-creation transaction.
///
/// The non-id fields are fixed demonstration values; only the id varies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,
    pub color: String,
    pub size: u32,
    pub owner: String,
    pub appraised_value: u64,
}

impl Workload {
    /// Build a workload with the standard demonstration asset fields.
    pub fn new(id: WorkloadId) -> Self {
        Self {
            id,
            color: "yellow".to_string(),
            size: 10,
            owner: "Tom".to_string(),
            appraised_value: 1300,
        }
    }

    /// Render the `CreateAsset` invocation for this workload.
    pub fn to_request(&self, channel: &str, chaincode: &str) -> TransactionRequest {
        TransactionRequest {
            channel: channel.to_string(),
            chaincode: chaincode.to_string(),
            function: CREATE_ASSET_FN.to_string(),
            args: vec![
                self.id.to_string(),
                self.color.clone(),
                self.size.to_string(),
                self.owner.clone(),
                self.appraised_value.to_string(),
            ],
            is_init: false,
        }
    }
}

/// A chaincode invocation as handed to a ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub channel: String,
    pub chaincode: String,
    pub function: String,
    pub args: Vec<String>,
    pub is_init: bool,
}

impl TransactionRequest {
    /// The one-time `InitLedger` invocation.
    pub fn init_ledger(channel: &str, chaincode: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chaincode: chaincode.to_string(),
            function: INIT_LEDGER_FN.to_string(),
            args: Vec::new(),
            is_init: true,
        }
    }
}
