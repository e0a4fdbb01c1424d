//! Error types for the FabConnect backend.

use ledger_core::LedgerError;
use thiserror::Error;

/// Errors that can occur while talking to a FabConnect gateway.
#[derive(Error, Debug)]
pub enum FabconnectError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected status {status} from {endpoint}: {body}")]
    UnexpectedStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Gateway is saturated after {attempts} attempts: {message}")]
    Saturated { attempts: u32, message: String },

    #[error("Transaction was not sent by the gateway")]
    NotSent,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FabconnectError {
    /// Map a failure during a submit call into the per-item error class.
    pub fn into_submission(self) -> LedgerError {
        LedgerError::Submission(self.to_string())
    }

    /// Map a failure while establishing the session or event stream.
    pub fn into_connection(self) -> LedgerError {
        LedgerError::Connection(self.to_string())
    }

    /// Map a failure during a receipt lookup.
    pub fn into_query(self) -> LedgerError {
        LedgerError::Query(self.to_string())
    }
}
