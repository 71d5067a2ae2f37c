mod common;

use std::time::Duration;

use dispatch_core::{DispatchError, JobStatus};
use dispatch_engine::RejectOutcome;
use dispatch_testing_utils::{ReadyOrderBuilder, TestConfig};
use tokio::time::{sleep, Instant};

use common::Harness;

#[tokio::test(start_paused = true)]
async fn test_rejected_courier_is_never_offered_again() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A", "B", "C"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 3).await);

    harness
        .engine
        .courier_rejected("order-1", "A")
        .await
        .unwrap();

    assert!(
        harness
            .wait_for_status("order-1", JobStatus::WaitingForCouriers)
            .await
    );

    // 三轮推送：第一轮A、B、C，之后两轮只有B、C
    let offered = harness.realtime.offered_couriers("order-1");
    assert_eq!(offered.len(), 7);
    assert_eq!(offered.iter().filter(|c| *c == "A").count(), 1);
    assert_eq!(harness.push.pushed_to("A").len(), 1);
    assert_eq!(harness.push.pushed_to("B").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_all_offered_rejected_ends_attempt_early() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A", "B"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 2).await);
    let started = Instant::now();

    let first = harness
        .engine
        .courier_rejected("order-1", "A")
        .await
        .unwrap();
    assert_eq!(
        first,
        RejectOutcome::Recorded {
            attempt_ended: false
        }
    );
    let second = harness
        .engine
        .courier_rejected("order-1", "B")
        .await
        .unwrap();
    assert_eq!(
        second,
        RejectOutcome::Recorded {
            attempt_ended: true
        }
    );

    assert!(
        harness
            .wait_for_status("order-1", JobStatus::WaitingForCouriers)
            .await
    );
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_rejection_is_persisted_with_ttl() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A", "B"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 2).await);

    harness
        .engine
        .courier_rejected("order-1", "A")
        .await
        .unwrap();

    assert!(harness.cache.rejected("order-1").contains("A"));
    assert_eq!(harness.cache.last_ttl(), Some(Duration::from_secs(3600)));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_rejection() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A", "B"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 2).await);

    harness
        .engine
        .courier_rejected("order-1", "A")
        .await
        .unwrap();
    let again = harness
        .engine
        .courier_rejected("order-1", "A")
        .await
        .unwrap();
    assert_eq!(again, RejectOutcome::Duplicate);
}

#[tokio::test(start_paused = true)]
async fn test_cache_failure_keeps_in_memory_rejection() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A", "B"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 2).await);

    harness.cache.set_failing(true);
    let result = harness.engine.courier_rejected("order-1", "A").await;
    assert!(matches!(result, Err(DispatchError::RejectionCache(_))));

    let job = harness
        .engine
        .job_snapshot("order-1")
        .await
        .unwrap()
        .unwrap();
    assert!(job.rejected_couriers.contains("A"));

    // 下一轮仍然排除A
    sleep(Duration::from_secs(61)).await;
    assert!(harness.wait_for_offers("order-1", 3).await);
    assert_eq!(
        harness.realtime.offered_couriers("order-1"),
        vec!["A", "B", "B"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejection_for_untracked_order_is_persisted() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A"]);

    let outcome = harness
        .engine
        .courier_rejected("order-9", "A")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RejectOutcome::Recorded {
            attempt_ended: false
        }
    );
    assert!(harness.cache.rejected("order-9").contains("A"));
}
