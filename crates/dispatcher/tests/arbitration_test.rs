mod common;

use std::time::Duration;

use dispatch_core::{DispatchError, DispatcherConfig, JobStatus, RemovalReason};
use dispatch_engine::AcceptOutcome;
use dispatch_testing_utils::{ReadyOrderBuilder, TestConfig, TestEnv};
use tokio::time::sleep;

use common::Harness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_have_single_winner() {
    let couriers = ["c1", "c2", "c3", "c4", "c5"];
    let harness = Harness::start(TestConfig::dispatcher(), &couriers);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", couriers.len()).await);

    let handles: Vec<_> = couriers
        .iter()
        .map(|courier_id| {
            let engine = harness.engine.clone();
            let courier_id = courier_id.to_string();
            tokio::spawn(async move { engine.courier_accepted("order-1", &courier_id).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    let winners = outcomes
        .iter()
        .filter(|o| **o == AcceptOutcome::Assigned)
        .count();
    let losers = outcomes
        .iter()
        .filter(|o| **o == AcceptOutcome::AlreadyAssigned)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(losers, couriers.len() - 1);

    let winner = harness.store.assigned_courier("order-1").unwrap();
    for courier_id in couriers.iter().filter(|c| **c != winner) {
        assert!(!harness.removals(courier_id, "order-1").is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_accept_from_courier_not_offered() {
    let mut config = TestConfig::dispatcher();
    config.max_fan_out = 1;
    let harness = Harness::start(config, &["A", "B"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 1).await);

    let outcome = harness
        .engine
        .courier_accepted("order-1", "B")
        .await
        .unwrap();
    assert_eq!(outcome, AcceptOutcome::NotOffered);
    assert_eq!(harness.store.assign_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_accept_after_rejecting_is_refused() {
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
    let outcome = harness
        .engine
        .courier_accepted("order-1", "A")
        .await
        .unwrap();
    assert_eq!(outcome, AcceptOutcome::NotOffered);
    assert!(harness.store.assigned_courier("order-1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_accept_after_final_expiry_is_refused() {
    let config = DispatcherConfig {
        max_attempts: 1,
        ..TestConfig::dispatcher()
    };
    let harness = Harness::start(config, &["A"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 1).await);

    sleep(Duration::from_secs(61)).await;
    assert!(
        harness
            .wait_for_status("order-1", JobStatus::WaitingForCouriers)
            .await
    );

    let outcome = harness
        .engine
        .courier_accepted("order-1", "A")
        .await
        .unwrap();
    assert_eq!(outcome, AcceptOutcome::OfferExpired);
    assert!(harness.store.assigned_courier("order-1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_propagates_and_keeps_job_active() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 1).await);

    harness.store.set_failing(true);
    let result = harness.engine.courier_accepted("order-1", "A").await;
    assert!(matches!(result, Err(DispatchError::OrderStore(_))));

    let job = harness
        .engine
        .job_snapshot("order-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Active);
    assert!(harness.store.assigned_courier("order-1").is_none());

    harness.store.set_failing(false);
    let outcome = harness
        .engine
        .courier_accepted("order-1", "A")
        .await
        .unwrap();
    assert_eq!(outcome, AcceptOutcome::Assigned);
}

#[tokio::test(start_paused = true)]
async fn test_order_assigned_elsewhere_reports_already_assigned() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A", "B"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 2).await);

    harness.store.assign_externally("order-1", "Z");
    let outcome = harness
        .engine
        .courier_accepted("order-1", "A")
        .await
        .unwrap();
    assert_eq!(outcome, AcceptOutcome::AlreadyAssigned);
    assert_eq!(
        harness.removals("A", "order-1"),
        vec![RemovalReason::AlreadyAssigned]
    );
    assert_eq!(harness.store.assigned_courier("order-1").as_deref(), Some("Z"));
}

#[tokio::test(start_paused = true)]
async fn test_untracked_order_is_arbitrated_by_store() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A"]);
    // 订单由其他实例派单，本实例只持有存储
    harness
        .store
        .insert_ready(ReadyOrderBuilder::new().with_id("order-9").build());

    let outcome = harness
        .engine
        .courier_accepted("order-9", "A")
        .await
        .unwrap();
    assert_eq!(outcome, AcceptOutcome::Assigned);
    assert_eq!(harness.store.assigned_courier("order-9").as_deref(), Some("A"));

    let second = harness
        .engine
        .courier_accepted("order-9", "B")
        .await
        .unwrap();
    assert_eq!(second, AcceptOutcome::AlreadyAssigned);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_courier_can_still_accept() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A", "B"]);
    harness.realtime.fail_for("A");
    harness.push.fail_for("A");

    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 1).await);
    assert_eq!(harness.realtime.offered_couriers("order-1"), vec!["B"]);
    assert_eq!(harness.push.pushed_to("B").len(), 1);

    let outcome = harness
        .engine
        .courier_accepted("order-1", "A")
        .await
        .unwrap();
    assert_eq!(outcome, AcceptOutcome::Assigned);
}

#[tokio::test(start_paused = true)]
async fn test_assignment_stands_when_engine_stops_mid_accept() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A"]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(harness.wait_for_offers("order-1", 1).await);

    // 条件写入挂起期间停止引擎
    harness.store.set_assign_delay(Duration::from_secs(5));
    let engine = harness.engine.clone();
    let accept = tokio::spawn(async move { engine.courier_accepted("order-1", "A").await });

    let store = harness.store.clone();
    assert!(
        TestEnv::wait_for(
            move || {
                let store = store.clone();
                async move { store.assign_calls() == 1 }
            },
            Duration::from_secs(1),
        )
        .await
    );
    harness.engine.shutdown().await;

    let outcome = accept.await.unwrap().unwrap();
    assert_eq!(outcome, AcceptOutcome::Assigned);
    assert_eq!(harness.store.assigned_courier("order-1").as_deref(), Some("A"));
    assert_eq!(
        harness
            .couriers
            .get_courier("A")
            .and_then(|c| c.active_order_id)
            .as_deref(),
        Some("order-1")
    );
}
