//! CLI argument definitions for the FabConnect backend.

use crate::config::{FabconnectConfig, RetryPolicy};
use clap::Args;
use std::time::Duration;

/// FabConnect connection arguments.
#[derive(Args, Clone, Debug)]
pub struct FabconnectArgs {
    /// FabConnect REST endpoint
    #[arg(long, env = "FABCONNECT_URL", default_value = "http://localhost:3000")]
    pub fabconnect_url: String,

    /// FabConnect websocket endpoint for event streams
    #[arg(long, env = "FABCONNECT_WS_URL", default_value = "ws://localhost:3001/ws")]
    pub fabconnect_ws_url: String,

    /// Keep the event stream on the gateway after the run
    #[arg(long, env = "NO_CLEANUP")]
    pub no_cleanup: bool,

    /// Retries for "Too many in-flight transactions" responses
    #[arg(long, default_value = "10")]
    pub max_retries: u32,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "30")]
    pub request_timeout_secs: u64,

    /// Receipt lookups in flight at once per poll sweep
    #[arg(long, env = "RECEIPT_CONCURRENCY", default_value = "16")]
    pub receipt_concurrency: usize,
}

impl FabconnectArgs {
    /// Build the client configuration for the given signer identity.
    pub fn to_config(&self, signer: &str) -> FabconnectConfig {
        FabconnectConfig::new(&self.fabconnect_url, &self.fabconnect_ws_url, signer)
            .with_cleanup(!self.no_cleanup)
            .with_retry(RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            })
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_receipt_concurrency(self.receipt_concurrency)
    }
}
