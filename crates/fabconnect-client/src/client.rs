//! REST side of the FabConnect backend: submit and receipt lookup.

use crate::config::FabconnectConfig;
use crate::error::FabconnectError;
use crate::model::{ErrorBody, Receipt, SendConfirmation, TransactionPayload, TOO_MANY_IN_FLIGHT};
use async_trait::async_trait;
use ledger_client::{LedgerClient, ReceiptSource};
use ledger_core::{CorrelationId, LedgerError, ReceiptStatus, Submission, TransactionRequest};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

/// Which identifier `submit` hands back for correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitHandle {
    /// The gateway's receipt id, for polling.
    #[default]
    Receipt,
    /// The asset id of the workload, matched against chaincode events.
    AssetId,
}

/// HTTP client for a FabConnect gateway.
#[derive(Clone)]
pub struct FabconnectClient {
    http: reqwest::Client,
    config: FabconnectConfig,
    handle: SubmitHandle,
}

impl FabconnectClient {
    pub fn new(config: FabconnectConfig) -> Result<Self, FabconnectError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            handle: SubmitHandle::default(),
        })
    }

    pub fn with_submit_handle(mut self, handle: SubmitHandle) -> Self {
        self.handle = handle;
        self
    }

    pub fn config(&self) -> &FabconnectConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// POST a transaction, retrying while the gateway reports saturation.
    async fn send_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<SendConfirmation, FabconnectError> {
        let url = self.config.endpoint("/transactions?fly-sync=false");
        let payload = TransactionPayload::from_request(request, &self.config.signer);
        let mut attempt = 0u32;

        loop {
            let response = self.http.post(&url).json(&payload).send().await?;
            let status = response.status();

            if status == StatusCode::ACCEPTED {
                let confirmation: SendConfirmation = response.json().await?;
                if !confirmation.sent {
                    return Err(FabconnectError::NotSent);
                }
                return Ok(confirmation);
            }

            let body = response.text().await.unwrap_or_default();
            let message = ErrorBody::parse(&body);
            if message.as_deref() != Some(TOO_MANY_IN_FLIGHT) {
                return Err(FabconnectError::UnexpectedStatus {
                    endpoint: "/transactions".to_string(),
                    status: status.as_u16(),
                    body: message.unwrap_or(body),
                });
            }

            attempt += 1;
            if attempt > self.config.retry.max_retries {
                return Err(FabconnectError::Saturated {
                    attempts: attempt,
                    message: TOO_MANY_IN_FLIGHT.to_string(),
                });
            }
            let delay = self.config.retry.backoff(attempt);
            debug!("Gateway saturated, retry {} in {:?}", attempt, delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn fetch_receipt(&self, id: &CorrelationId) -> Result<Option<Receipt>, FabconnectError> {
        let path = format!("/receipts/{id}");
        let response = self.http.get(self.config.endpoint(&path)).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FabconnectError::UnexpectedStatus {
                endpoint: path,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(Some(response.json().await?))
    }

    fn correlation_id(&self, request: &TransactionRequest, receipt_id: String) -> CorrelationId {
        match (self.handle, request.args.first()) {
            (SubmitHandle::AssetId, Some(asset_id)) if !request.is_init => {
                CorrelationId::new(asset_id.clone())
            }
            _ => CorrelationId::new(receipt_id),
        }
    }
}

#[async_trait]
impl LedgerClient for FabconnectClient {
    fn name(&self) -> &str {
        "fabconnect"
    }

    /// Verify the gateway is reachable and knows the signing identity.
    async fn connect(&self) -> Result<(), LedgerError> {
        let path = format!("/identities/{}", self.config.signer);
        let response = self
            .http
            .get(self.config.endpoint(&path))
            .send()
            .await
            .map_err(|e| FabconnectError::from(e).into_connection())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FabconnectError::UnexpectedStatus {
                endpoint: path,
                status: status.as_u16(),
                body,
            }
            .into_connection());
        }

        info!("Using FabConnect identity: {}", self.config.signer);
        Ok(())
    }

    async fn submit(&self, request: &TransactionRequest) -> Result<Submission, LedgerError> {
        let confirmation = self
            .send_transaction(request)
            .await
            .map_err(FabconnectError::into_submission)?;
        debug!("{} accepted with receipt {}", request.function, confirmation.id);
        Ok(Submission::Accepted(
            self.correlation_id(request, confirmation.id),
        ))
    }
}

#[async_trait]
impl ReceiptSource for FabconnectClient {
    fn max_concurrent_lookups(&self) -> usize {
        self.config.receipt_concurrency
    }

    async fn get_outcome(&self, id: &CorrelationId) -> Result<ReceiptStatus, LedgerError> {
        match self.fetch_receipt(id).await {
            Ok(Some(receipt)) => Ok(receipt.status()),
            Ok(None) => Ok(ReceiptStatus::Pending),
            Err(e) => {
                warn!("Failed to get receipt {}: {}", id, e);
                Err(e.into_query())
            }
        }
    }
}
