//! FabConnect REST behaviour against a mock gateway.

use fabconnect_client::{FabconnectClient, FabconnectConfig, FabconnectEvents, RetryPolicy, SubmitHandle};
use ledger_client::{EventSource, LedgerClient, ReceiptSource, SubscriptionHandle};
use ledger_core::{
    Confirmation, CorrelationId, LedgerError, ReceiptStatus, Submission, Workload, WorkloadId,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> FabconnectConfig {
    FabconnectConfig::new(&server.uri(), "ws://127.0.0.1:1/ws", "user1").with_retry(RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    })
}

fn create_asset(id: &str) -> ledger_core::TransactionRequest {
    Workload::new(WorkloadId::new(id)).to_request("default-channel", "asset_transfer")
}

fn saturated() -> ResponseTemplate {
    ResponseTemplate::new(429).set_body_json(json!({ "error": "Too many in-flight transactions" }))
}

#[tokio::test]
async fn test_submit_returns_receipt_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .and(query_param("fly-sync", "false"))
        .and(body_partial_json(json!({
            "headers": { "type": "SendTransaction", "signer": "user1", "chaincode": "asset_transfer" },
            "func": "CreateAsset"
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "sent": true, "id": "r-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FabconnectClient::new(config(&server)).unwrap();
    let submission = client.submit(&create_asset("asset-1")).await.unwrap();

    assert_eq!(submission, Submission::Accepted(CorrelationId::from("r-1")));
}

#[tokio::test]
async fn test_submit_correlates_by_asset_id_for_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "sent": true, "id": "r-2" })))
        .mount(&server)
        .await;

    let client = FabconnectClient::new(config(&server))
        .unwrap()
        .with_submit_handle(SubmitHandle::AssetId);
    let submission = client.submit(&create_asset("asset-2")).await.unwrap();

    assert_eq!(submission.correlation_id().as_str(), "asset-2");
}

#[tokio::test]
async fn test_saturation_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(saturated())
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "sent": true, "id": "r-3" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FabconnectClient::new(config(&server)).unwrap();
    let submission = client.submit(&create_asset("asset-3")).await.unwrap();

    assert_eq!(submission.correlation_id().as_str(), "r-3");
}

#[tokio::test]
async fn test_saturation_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(saturated())
        .expect(4)
        .mount(&server)
        .await;

    let client = FabconnectClient::new(config(&server)).unwrap();
    let err = client.submit(&create_asset("asset-4")).await.unwrap_err();

    assert!(matches!(err, LedgerError::Submission(ref m) if m.contains("saturated")));
}

#[tokio::test]
async fn test_other_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "endorsement failed" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FabconnectClient::new(config(&server)).unwrap();
    let err = client.submit(&create_asset("asset-5")).await.unwrap_err();

    assert!(matches!(err, LedgerError::Submission(ref m) if m.contains("endorsement failed")));
}

#[tokio::test]
async fn test_unsent_transaction_is_a_submission_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "sent": false })))
        .mount(&server)
        .await;

    let client = FabconnectClient::new(config(&server)).unwrap();
    let err = client.submit(&create_asset("asset-6")).await.unwrap_err();

    assert!(matches!(err, LedgerError::Submission(_)));
}

#[tokio::test]
async fn test_receipt_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/receipts/r-ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "r-ok",
            "headers": { "type": "TransactionSuccess", "timeElapsed": 1.5 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/receipts/r-missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/receipts/r-broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = FabconnectClient::new(config(&server)).unwrap();

    assert_eq!(
        client.get_outcome(&CorrelationId::from("r-ok")).await.unwrap(),
        ReceiptStatus::Resolved(Confirmation::success().with_elapsed(Duration::from_millis(1500)))
    );
    assert_eq!(
        client.get_outcome(&CorrelationId::from("r-missing")).await.unwrap(),
        ReceiptStatus::Pending
    );
    assert!(matches!(
        client.get_outcome(&CorrelationId::from("r-broken")).await,
        Err(LedgerError::Query(_))
    ));
}

#[tokio::test]
async fn test_receipt_sweep_respects_concurrency_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/receipts/"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(100)))
        .expect(8)
        .mount(&server)
        .await;

    let client = FabconnectClient::new(config(&server).with_receipt_concurrency(2)).unwrap();
    let ids: Vec<CorrelationId> = (0..8).map(|i| CorrelationId::new(format!("r-{i}"))).collect();

    let started = std::time::Instant::now();
    let results = client.get_outcomes(&ids).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 8);
    assert!(results
        .iter()
        .all(|(_, r)| matches!(r, Ok(ReceiptStatus::Pending))));
    // Two lookups at a time: four rounds of 100ms.
    assert!(elapsed >= Duration::from_millis(380), "sweep took {elapsed:?}");
}

#[tokio::test]
async fn test_connect_checks_identity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/identities/user1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "user1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FabconnectClient::new(config(&server)).unwrap();
    tokio_test::assert_ok!(client.connect().await);
}

#[tokio::test]
async fn test_failed_subscription_deletes_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/eventstreams"))
        .and(body_partial_json(json!({
            "name": "fabconnect-perf-1",
            "type": "websocket",
            "batchSize": 5,
            "websocket": { "topic": "fabconnect-perf-topic-1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "es-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chainInfo"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/eventstreams/es-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let events = FabconnectEvents::new(FabconnectClient::new(config(&server)).unwrap());
    let topic = ledger_client::EventTopic {
        channel: "default-channel".to_string(),
        chaincode: "asset_transfer".to_string(),
        batch_size: 5,
    };

    let err = events.subscribe(&topic).await.err().unwrap();
    assert!(matches!(err, LedgerError::Connection(_)));
}

#[tokio::test]
async fn test_unsubscribe_respects_cleanup_flag() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/eventstreams/es-2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let handle = SubscriptionHandle {
        id: "es-2".to_string(),
    };

    let keep = FabconnectEvents::new(
        FabconnectClient::new(config(&server).with_cleanup(false)).unwrap(),
    );
    keep.unsubscribe(&handle).await.unwrap();

    let cleanup = FabconnectEvents::new(FabconnectClient::new(config(&server)).unwrap());
    cleanup.unsubscribe(&handle).await.unwrap();
}
