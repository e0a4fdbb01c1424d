//! FabConnect wire payloads.
//!
//! Receipts and events are loosely typed on the wire. They are classified
//! into [`ReceiptStatus`] and [`CommitEvent`] here, once, so nothing
//! downstream inspects header strings.

use ledger_core::{CommitEvent, Confirmation, CorrelationId, ReceiptStatus, TransactionRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error message FabConnect returns when its submission queue is full.
pub const TOO_MANY_IN_FLIGHT: &str = "Too many in-flight transactions";

pub const RECEIPT_SUCCESS: &str = "TransactionSuccess";
pub const RECEIPT_FAILURE: &str = "TransactionFailure";
pub const RECEIPT_ERROR: &str = "Error";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionHeaders {
    #[serde(rename = "type")]
    pub kind: String,
    pub signer: String,
    pub channel: String,
    pub chaincode: String,
}

/// Body of `POST /transactions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionPayload {
    pub headers: TransactionHeaders,
    pub func: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub init: bool,
}

impl TransactionPayload {
    pub fn from_request(request: &TransactionRequest, signer: &str) -> Self {
        Self {
            headers: TransactionHeaders {
                kind: "SendTransaction".to_string(),
                signer: signer.to_string(),
                channel: request.channel.clone(),
                chaincode: request.chaincode.clone(),
            },
            func: request.function.clone(),
            args: request.args.clone(),
            init: request.is_init,
        }
    }
}

/// Response to an asynchronous `POST /transactions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendConfirmation {
    #[serde(default)]
    pub sent: bool,
    #[serde(default)]
    pub id: String,
}

/// Error body returned on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,
}

impl ErrorBody {
    pub fn parse(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .map(|e| e.error)
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptHeaders {
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Seconds between request and commit.
    #[serde(default)]
    pub time_elapsed: Option<f64>,
}

/// Response of `GET /receipts/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Receipt {
    #[serde(default, rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub headers: ReceiptHeaders,
}

impl Receipt {
    /// Classify the receipt by its header type.
    ///
    /// Anything other than a terminal success/failure type is still pending.
    pub fn status(&self) -> ReceiptStatus {
        let confirmation = match self.headers.kind.as_str() {
            RECEIPT_SUCCESS => Confirmation::success(),
            RECEIPT_FAILURE | RECEIPT_ERROR => Confirmation::failure(),
            _ => return ReceiptStatus::Pending,
        };
        match self.elapsed() {
            Some(elapsed) => ReceiptStatus::Resolved(confirmation.with_elapsed(elapsed)),
            None => ReceiptStatus::Resolved(confirmation),
        }
    }

    fn elapsed(&self) -> Option<Duration> {
        self.headers
            .time_elapsed
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebsocketSpec {
    pub topic: String,
}

/// Body of `POST /eventstreams`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventStreamRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub batch_size: usize,
    pub websocket: WebsocketSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventStreamCreated {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    pub chaincode_id: String,
}

/// Body of `POST /subscriptions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub stream: String,
    pub channel: String,
    pub name: String,
    pub signer: String,
    pub from_block: String,
    pub payload_type: String,
    pub filter: SubscriptionFilter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfo {
    pub height: u64,
}

/// Response of `GET /chainInfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfoResponse {
    pub result: ChainInfo,
}

/// Client frames sent on the websocket.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsCommand<'a> {
    Listen { topic: &'a str },
    Ack { topic: &'a str },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChaincodeEventPayload {
    #[serde(default, rename = "ID")]
    pub asset_id: Option<String>,
}

/// One chaincode event delivered on the websocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaincodeEvent {
    #[serde(default)]
    pub chaincode_id: String,
    #[serde(default)]
    pub block_number: Option<u64>,
    pub transaction_id: String,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub payload: Option<ChaincodeEventPayload>,
}

/// Which identifier of a chaincode event is matched against submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelateBy {
    /// The asset id carried in the event payload.
    #[default]
    AssetId,
    /// The ledger transaction id.
    TransactionId,
}

impl ChaincodeEvent {
    pub fn into_commit(self, by: CorrelateBy) -> CommitEvent {
        let asset_id = self.payload.and_then(|p| p.asset_id);
        let id = match (by, asset_id) {
            (CorrelateBy::AssetId, Some(asset_id)) => asset_id,
            _ => self.transaction_id,
        };
        CommitEvent {
            correlation_id: CorrelationId::new(id),
            block_number: self.block_number,
            confirmation: Confirmation::success(),
        }
    }
}

/// Decode one websocket frame into commit events.
pub fn decode_event_batch(
    frame: &str,
    by: CorrelateBy,
) -> Result<Vec<CommitEvent>, serde_json::Error> {
    let events: Vec<ChaincodeEvent> = serde_json::from_str(frame)?;
    Ok(events.into_iter().map(|e| e.into_commit(by)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{OutcomeStatus, Workload, WorkloadId};

    #[test]
    fn test_transaction_payload_shape() {
        let request = Workload::new(WorkloadId::new("asset-abc"))
            .to_request("default-channel", "asset_transfer");
        let payload = TransactionPayload::from_request(&request, "user1");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["headers"]["type"], "SendTransaction");
        assert_eq!(json["headers"]["signer"], "user1");
        assert_eq!(json["func"], "CreateAsset");
        assert_eq!(
            json["args"],
            serde_json::json!(["asset-abc", "yellow", "10", "Tom", "1300"])
        );
        assert!(json.get("init").is_none());
    }

    #[test]
    fn test_init_payload_sets_init_flag() {
        let request = TransactionRequest::init_ledger("default-channel", "asset_transfer");
        let json = serde_json::to_value(TransactionPayload::from_request(&request, "user1")).unwrap();
        assert_eq!(json["func"], "InitLedger");
        assert_eq!(json["init"], true);
    }

    #[test]
    fn test_receipt_classification() {
        let success: Receipt = serde_json::from_str(
            r#"{"_id":"r1","headers":{"type":"TransactionSuccess","timeElapsed":12.5}}"#,
        )
        .unwrap();
        match success.status() {
            ReceiptStatus::Resolved(c) => {
                assert_eq!(c.status, OutcomeStatus::Success);
                assert_eq!(c.elapsed, Some(Duration::from_millis(12_500)));
            }
            other => panic!("unexpected {other:?}"),
        }

        let failure: Receipt =
            serde_json::from_str(r#"{"headers":{"type":"Error"}}"#).unwrap();
        assert_eq!(failure.status(), ReceiptStatus::Resolved(Confirmation::failure()));

        let pending: Receipt = serde_json::from_str(r#"{"_id":"r3","headers":{}}"#).unwrap();
        assert_eq!(pending.status(), ReceiptStatus::Pending);
    }

    #[test]
    fn test_decode_event_batch() {
        let frame = r#"[
            {"chaincodeId":"asset_transfer","blockNumber":7,"transactionId":"tx1",
             "transactionIndex":0,"eventIndex":0,"eventName":"CreateAsset",
             "payload":{"ID":"asset-1"}},
            {"chaincodeId":"asset_transfer","blockNumber":7,"transactionId":"tx2",
             "transactionIndex":1,"eventIndex":0,"eventName":"CreateAsset"}
        ]"#;

        let events = decode_event_batch(frame, CorrelateBy::AssetId).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].correlation_id.as_str(), "asset-1");
        assert_eq!(events[0].block_number, Some(7));
        // no payload id, fall back to the transaction id
        assert_eq!(events[1].correlation_id.as_str(), "tx2");

        let events = decode_event_batch(frame, CorrelateBy::TransactionId).unwrap();
        assert_eq!(events[0].correlation_id.as_str(), "tx1");
    }

    #[test]
    fn test_decode_malformed_frame() {
        assert!(decode_event_batch(r#"{"not":"an array"}"#, CorrelateBy::AssetId).is_err());
    }

    #[test]
    fn test_ws_commands() {
        let listen = serde_json::to_string(&WsCommand::Listen { topic: "t1" }).unwrap();
        assert_eq!(listen, r#"{"type":"listen","topic":"t1"}"#);
        let ack = serde_json::to_string(&WsCommand::Ack { topic: "t1" }).unwrap();
        assert_eq!(ack, r#"{"type":"ack","topic":"t1"}"#);
    }

    #[test]
    fn test_error_body_parse() {
        assert_eq!(
            ErrorBody::parse(r#"{"error":"Too many in-flight transactions"}"#).as_deref(),
            Some(TOO_MANY_IN_FLIGHT)
        );
        assert_eq!(ErrorBody::parse("<html>"), None);
    }
}
