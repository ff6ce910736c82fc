//! Integration tests for payment processing
//!
//! - Rate limiting before any gateway is touched
//! - Priority failover that skips open gateways
//! - Manual queue fallback on exhaustion
//! - Durable file queue behind the registry

mod common;

use std::sync::Arc;

use common::{FakeGateway, Harness, processor};
use pretty_assertions::assert_eq;
use rally_resilience::core::names;
use rally_resilience::domain::{PaymentRequest, PaymentResponse, PaymentStatus};
use rally_resilience::queue::ItemStatus;
use rally_resilience::{FileQueue, Outcome, Rejection, ResilienceConfig, ResilienceError};

fn all_gateways() -> Vec<Arc<FakeGateway>> {
    vec![
        FakeGateway::healthy(names::STRIPE),
        FakeGateway::healthy(names::PAYPAL),
        FakeGateway::healthy(names::OXXO),
        FakeGateway::healthy(names::SPEI),
    ]
}

/// Test: the eleventh payment of a member within a minute is rejected
#[tokio::test]
async fn test_eleventh_payment_in_a_minute_is_rate_limited() {
    let harness = Harness::new();
    let gateways = all_gateways();
    let processor = processor(&harness.registry, &gateways);

    for _ in 0..10 {
        let outcome = processor
            .process_payment(PaymentRequest::new(10_000, "card", "member-1"))
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    let outcome = processor
        .process_payment(PaymentRequest::new(10_000, "card", "member-1"))
        .await
        .unwrap();
    match outcome {
        Outcome::Rejected(Rejection::RateLimited { violations, .. }) => {
            assert_eq!(violations, vec!["user_transactions_per_minute_exceeded"]);
        }
        other => panic!("expected rate limit rejection, got {other:?}"),
    }
    assert_eq!(gateways[0].calls(), 10);

    // Other members are unaffected
    let outcome = processor
        .process_payment(PaymentRequest::new(10_000, "card", "member-2"))
        .await
        .unwrap();
    assert!(outcome.is_success());
}

/// Test: rate check and record are separate operations
#[tokio::test]
async fn test_check_rate_limit_is_a_pure_read() {
    let harness = Harness::new();
    for _ in 0..10 {
        harness.registry.record_transaction("member-1", 100, "spei").await;
    }
    let first = harness.registry.check_rate_limit("member-1", 100, "spei").await;
    let second = harness.registry.check_rate_limit("member-1", 100, "spei").await;
    assert!(!first.allowed);
    assert_eq!(first, second);
}

/// Test: with stripe open a card payment goes to paypal and stripe is never called
#[tokio::test]
async fn test_open_primary_fails_over_to_secondary() {
    let harness = Harness::new();
    let gateways = all_gateways();
    let processor = processor(&harness.registry, &gateways);
    harness.trip(names::STRIPE).await;

    let outcome = processor
        .process_payment(PaymentRequest::new(75_000, "card", "member-1"))
        .await
        .unwrap();

    let response = PaymentResponse::from(&outcome);
    assert_eq!(response.status, PaymentStatus::Success);
    assert_eq!(response.resource.as_deref(), Some("paypal"));
    assert_eq!(gateways[0].calls(), 0);
    assert_eq!(gateways[1].calls(), 1);
}

/// Test: a failing gateway is recorded and the next one charges
#[tokio::test]
async fn test_failing_gateway_trips_and_is_skipped_later() {
    let harness = Harness::new();
    let stripe = FakeGateway::failing(names::STRIPE);
    let paypal = FakeGateway::healthy(names::PAYPAL);
    let processor = processor(&harness.registry, &[stripe.clone(), paypal.clone()]);

    // Each payment from a different member keeps per-member quotas out of the way
    for member in 0..8 {
        let outcome = processor
            .process_payment(PaymentRequest::new(1_000, "card", format!("member-{member}")))
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    // Stripe preset opens after 5 failures
    assert_eq!(stripe.calls(), 5);
    assert_eq!(paypal.calls(), 8);
    let health = harness.registry.health_status(&[names::STRIPE]).await.unwrap();
    assert!(!health.overall_healthy);
}

/// Test: every compatible gateway open queues exactly one item
#[tokio::test]
async fn test_exhaustion_queues_for_manual_processing() {
    let harness = Harness::new();
    let gateways = all_gateways();
    let processor = processor(&harness.registry, &gateways);
    harness.trip(names::STRIPE).await;
    harness.trip(names::PAYPAL).await;
    let before = harness.registry.manual_queue_status().await.unwrap();

    let outcome = processor
        .process_payment(
            PaymentRequest::new(250_000, "card", "member-1").with_metadata("invoice", "INV-2291"),
        )
        .await
        .unwrap();

    let response = PaymentResponse::from(&outcome);
    assert_eq!(response.status, PaymentStatus::QueuedForManualProcessing);
    assert!(response.queue_id.is_some());

    let after = harness.registry.manual_queue_status().await.unwrap();
    assert_eq!(after.queue_length, before.queue_length + 1);
    assert_eq!(after.total_pending_amount, 250_000);
    assert_eq!(harness.alerts.len(), 1);

    let pending = harness.registry.queue().pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload.metadata["invoice"], "INV-2291");
    assert_eq!(pending[0].payload.metadata["skipped_gateways"], "stripe,paypal");
    assert!(gateways.iter().all(|g| g.calls() == 0));
}

/// Test: gateways that all fail also end in the queue
#[tokio::test]
async fn test_all_gateways_failing_queues() {
    let harness = Harness::new();
    let spei = FakeGateway::failing(names::SPEI);
    let processor = processor(&harness.registry, &[spei.clone()]);

    let outcome = processor
        .process_payment(PaymentRequest::new(5_000, "bank_transfer", "member-3"))
        .await
        .unwrap();

    assert!(outcome.is_queued());
    assert_eq!(spei.calls(), 1);
    let item = &harness.registry.queue().pending().await.unwrap()[0];
    assert_eq!(item.payload.metadata["attempted_gateways"], "spei");
}

/// Test: health and queue status are free of side effects
#[tokio::test]
async fn test_observation_is_idempotent() {
    let harness = Harness::new();
    let gateways = all_gateways();
    let processor = processor(&harness.registry, &gateways);
    harness.trip(names::OXXO).await;
    harness.trip(names::STRIPE).await;
    let _ = processor
        .process_payment(PaymentRequest::new(9_900, "oxxo", "member-5"))
        .await
        .unwrap();
    harness.advance(300);

    let breakers = [names::STRIPE, names::PAYPAL, names::OXXO, names::SPEI];
    let first = harness.registry.health_status(&breakers).await.unwrap();
    let second = harness.registry.health_status(&breakers).await.unwrap();
    assert_eq!(first, second);

    let first = harness.registry.manual_queue_status().await.unwrap();
    let second = harness.registry.manual_queue_status().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.queue_length, 1);
}

/// Test: the file queue keeps items across registries and drains by id
#[tokio::test]
async fn test_file_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manual_queue.jsonl");

    let queue_id = {
        let harness = Harness::build(
            ResilienceConfig::default(),
            None,
            Some(Arc::new(FileQueue::new(&path))),
        );
        let processor = processor(&harness.registry, &[]);
        match processor
            .process_payment(PaymentRequest::new(12_345, "card", "member-9"))
            .await
            .unwrap()
        {
            Outcome::Queued { queue_id } => queue_id,
            other => panic!("expected queued outcome, got {other:?}"),
        }
    };

    let restarted = Harness::build(
        ResilienceConfig::default(),
        None,
        Some(Arc::new(FileQueue::new(&path))),
    );
    let status = restarted.registry.manual_queue_status().await.unwrap();
    assert_eq!(status.queue_length, 1);
    assert_eq!(status.total_pending_amount, 12_345);

    assert!(restarted.registry.queue().mark_processed(queue_id).await.unwrap());
    let items = FileQueue::new(&path);
    let items = rally_resilience::ManualQueue::items(&items).await.unwrap();
    assert_eq!(items[0].status, ItemStatus::Processed);
}

/// Test: a queue that cannot be written propagates the failure
#[tokio::test]
async fn test_queue_write_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let harness = Harness::build(
        ResilienceConfig::default(),
        None,
        Some(Arc::new(FileQueue::new(blocker.join("queue.jsonl")))),
    );
    let processor = processor(&harness.registry, &[]);

    let error = processor
        .process_payment(PaymentRequest::new(1_000, "card", "member-1"))
        .await
        .unwrap_err();
    assert!(matches!(error, ResilienceError::ManualQueueWrite { .. }));
    assert!(harness.alerts.is_empty());
}
