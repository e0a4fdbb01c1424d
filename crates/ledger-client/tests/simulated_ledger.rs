//! Event and receipt behaviour of the simulated ledger.

use ledger_client::{EventSource, EventTopic, LedgerClient, ReceiptSource, SimulatedConfig, SimulatedLedger};
use ledger_core::{CommitEvent, CorrelationId, LedgerError, OutcomeStatus, ReceiptStatus, Workload, WorkloadId};
use std::time::Duration;

fn topic(batch_size: usize) -> EventTopic {
    EventTopic {
        channel: "default-channel".to_string(),
        chaincode: "asset_transfer".to_string(),
        batch_size,
    }
}

fn request(id: &str) -> ledger_core::TransactionRequest {
    Workload::new(WorkloadId::new(id)).to_request("default-channel", "asset_transfer")
}

#[tokio::test(start_paused = true)]
async fn test_commit_events_delivered_to_subscriber() {
    let ledger = SimulatedLedger::new(
        SimulatedConfig::default().with_commit_latency(Duration::from_millis(50)),
    );
    let mut subscription = ledger.subscribe(&topic(1)).await.unwrap();

    let submission = ledger.submit(&request("asset-1")).await.unwrap();
    let batch = subscription.events.recv().await.unwrap().unwrap();

    assert_eq!(batch.len(), 1);
    assert_eq!(&batch[0].correlation_id, submission.correlation_id());
    assert_eq!(batch[0].block_number, Some(1));
    assert_eq!(batch[0].confirmation.status, OutcomeStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn test_batches_respect_batch_size() {
    let ledger = SimulatedLedger::new(SimulatedConfig::instant());
    let mut subscription = ledger.subscribe(&topic(2)).await.unwrap();

    for i in 0..5 {
        ledger.publish(CommitEvent::committed(CorrelationId::new(format!("tx-{i}"))));
    }

    let mut received = 0;
    while received < 5 {
        let batch = subscription.events.recv().await.unwrap().unwrap();
        assert!(!batch.is_empty() && batch.len() <= 2);
        received += batch.len();
    }
    assert_eq!(received, 5);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_events_are_delivered_twice() {
    let ledger = SimulatedLedger::new(SimulatedConfig::instant().with_duplicate_events());
    let mut subscription = ledger.subscribe(&topic(10)).await.unwrap();

    ledger.publish(CommitEvent::committed(CorrelationId::from("tx-dup")));

    let mut seen = Vec::new();
    while seen.len() < 2 {
        seen.extend(subscription.events.recv().await.unwrap().unwrap());
    }
    assert!(seen.iter().all(|e| e.correlation_id.as_str() == "tx-dup"));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_does_not_close_stream() {
    let ledger = SimulatedLedger::new(SimulatedConfig::instant());
    let mut subscription = ledger.subscribe(&topic(1)).await.unwrap();

    ledger.publish_malformed("expected array of events");
    ledger.publish(CommitEvent::committed(CorrelationId::from("tx-after")));

    let first = subscription.events.recv().await.unwrap();
    assert!(matches!(first, Err(LedgerError::Protocol(_))));

    let second = subscription.events.recv().await.unwrap().unwrap();
    assert_eq!(second[0].correlation_id.as_str(), "tx-after");
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_ends_stream() {
    let ledger = SimulatedLedger::new(SimulatedConfig::instant());
    let mut subscription = ledger.subscribe(&topic(1)).await.unwrap();
    assert_eq!(ledger.subscriber_count(), 1);

    ledger.unsubscribe(&subscription.handle).await.unwrap();

    assert_eq!(ledger.subscriber_count(), 0);
    assert!(subscription.events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_receipt_resolves_after_commit_latency() {
    let ledger = SimulatedLedger::new(
        SimulatedConfig::instant().with_commit_latency(Duration::from_secs(3)),
    );
    let submission = tokio_test::assert_ok!(ledger.submit(&request("asset-1")).await);
    let id = submission.correlation_id().clone();

    assert_eq!(ledger.get_outcome(&id).await.unwrap(), ReceiptStatus::Pending);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(matches!(
        ledger.get_outcome(&id).await.unwrap(),
        ReceiptStatus::Resolved(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_batched_receipt_lookup() {
    let ledger = SimulatedLedger::new(SimulatedConfig::instant().with_reject_every(2));

    let mut ids = Vec::new();
    for i in 0..4 {
        let submission = ledger.submit(&request(&format!("asset-{i}"))).await.unwrap();
        ids.push(submission.correlation_id().clone());
    }
    ids.push(CorrelationId::from("unknown"));

    let results = ledger.get_outcomes(&ids).await;
    assert_eq!(results.len(), 5);

    let statuses: Vec<_> = results
        .into_iter()
        .map(|(_, r)| match r.unwrap() {
            ReceiptStatus::Resolved(c) => Some(c.status),
            ReceiptStatus::Pending => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            Some(OutcomeStatus::Success),
            Some(OutcomeStatus::Failure),
            Some(OutcomeStatus::Success),
            Some(OutcomeStatus::Failure),
            None,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_never_confirm_stays_pending() {
    let ledger = SimulatedLedger::new(SimulatedConfig::instant().never_confirming());
    let mut subscription = ledger.subscribe(&topic(1)).await.unwrap();
    let submission = ledger.submit(&request("asset-1")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(
        ledger.get_outcome(submission.correlation_id()).await.unwrap(),
        ReceiptStatus::Pending
    );
    assert!(subscription.events.try_recv().is_err());
}
