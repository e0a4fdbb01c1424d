//! FabConnect client configuration.

use ledger_client::DEFAULT_LOOKUP_CONCURRENCY;
use std::time::Duration;

/// Name of the event stream created for a run.
pub const EVENT_STREAM_NAME: &str = "fabconnect-perf-1";

/// Websocket topic the event stream publishes on.
pub const EVENT_TOPIC: &str = "fabconnect-perf-topic-1";

/// Name of the chaincode event subscription created for a run.
pub const SUBSCRIPTION_NAME: &str = "fabconnect-perf-subscription-1";

/// Bounded exponential backoff for saturated-gateway responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Connection settings for a FabConnect gateway.
#[derive(Debug, Clone)]
pub struct FabconnectConfig {
    /// REST endpoint, without a trailing slash.
    pub base_url: String,
    pub ws_url: String,
    /// Identity that signs every transaction.
    pub signer: String,
    /// Delete the event stream on unsubscribe.
    pub cleanup: bool,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    /// Receipt lookups in flight at once during a poll sweep.
    pub receipt_concurrency: usize,
    pub stream_name: String,
    pub topic: String,
    pub subscription_name: String,
}

impl FabconnectConfig {
    pub fn new(base_url: &str, ws_url: &str, signer: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ws_url: ws_url.to_string(),
            signer: signer.to_string(),
            cleanup: true,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            receipt_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
            stream_name: EVENT_STREAM_NAME.to_string(),
            topic: EVENT_TOPIC.to_string(),
            subscription_name: SUBSCRIPTION_NAME.to_string(),
        }
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_receipt_concurrency(mut self, limit: usize) -> Self {
        self.receipt_concurrency = limit.max(1);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
