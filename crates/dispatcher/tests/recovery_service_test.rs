mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dispatch_core::{JobStatus, OrderStore};
use dispatch_engine::{OrderRecoveryService, RecoveryService};
use dispatch_testing_utils::{
    CourierInfoBuilder, MockOrderStore, MockRejectionCache, ReadyOrderBuilder, TestConfig,
};
use tokio::sync::broadcast;
use tokio::time::sleep;

use common::Harness;

#[tokio::test]
async fn test_discover_returns_oldest_first_within_window() {
    let order_store = Arc::new(MockOrderStore::new());
    let rejection_cache = Arc::new(MockRejectionCache::new());
    let now = Utc::now();

    for (id, minutes_ago) in [("newer", 5), ("oldest", 60), ("middle", 30)] {
        order_store.insert_ready(
            ReadyOrderBuilder::new()
                .with_id(id)
                .with_ready_at(now - chrono::Duration::minutes(minutes_ago))
                .build(),
        );
    }
    order_store.insert_ready(
        ReadyOrderBuilder::new()
            .with_id("stale")
            .with_ready_at(now - chrono::Duration::hours(25))
            .build(),
    );
    order_store.insert_ready(ReadyOrderBuilder::new().with_id("taken").build());
    assert!(order_store.try_assign("taken", "courier-9").await.unwrap());
    rejection_cache.seed("middle", &["courier-1"]);

    let recovery_service = OrderRecoveryService::new(
        order_store.clone(),
        rejection_cache.clone(),
        chrono::Duration::hours(24),
    );
    let jobs = recovery_service.discover_unassigned_jobs().await.unwrap();

    let ids: Vec<&str> = jobs.iter().map(|job| job.order_id.as_str()).collect();
    assert_eq!(ids, vec!["oldest", "middle", "newer"]);
    assert!(jobs.iter().all(|job| job.attempts == 0));
    assert!(jobs.iter().all(|job| job.status == JobStatus::Queued));
    assert!(jobs[1].rejected_couriers.contains("courier-1"));
    assert!(jobs[0].rejected_couriers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_twice_enqueues_each_order_once() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A"]);
    let now = Utc::now();
    for (id, minutes_ago) in [("order-1", 10), ("order-2", 5)] {
        harness.store.insert_ready(
            ReadyOrderBuilder::new()
                .with_id(id)
                .with_ready_at(now - chrono::Duration::minutes(minutes_ago))
                .build(),
        );
    }

    let first = harness.engine.trigger_recovery_sweep().await.unwrap();
    assert_eq!(first.discovered, 2);
    assert_eq!(first.enqueued, vec!["order-1", "order-2"]);

    let second = harness.engine.trigger_recovery_sweep().await.unwrap();
    assert_eq!(second.discovered, 2);
    assert!(second.enqueued.is_empty());
    assert_eq!(second.already_tracked, 2);

    assert!(harness.wait_for_offers("order-1", 1).await);
    let queued = harness.engine.queued_orders().await.unwrap();
    assert_eq!(queued, vec!["order-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_courier_online_requeues_parked_order() {
    let harness = Harness::start(TestConfig::dispatcher(), &[]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(
        harness
            .wait_for_status("order-1", JobStatus::WaitingForCouriers)
            .await
    );

    harness
        .couriers
        .add_courier(CourierInfoBuilder::new().with_id("A").build());
    harness.connections.connect("A");

    let report = harness.engine.courier_came_online("A").await.unwrap();
    assert_eq!(report.enqueued, vec!["order-1"]);

    assert!(harness.wait_for_offers("order-1", 1).await);
    let job = harness
        .engine
        .job_snapshot("order-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Active);
    assert_eq!(job.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_reseeds_rejections_from_cache() {
    let harness = Harness::start(TestConfig::dispatcher(), &["A", "B"]);
    harness
        .store
        .insert_ready(ReadyOrderBuilder::new().with_id("order-1").build());
    harness.cache.seed("order-1", &["A"]);

    harness.engine.trigger_recovery_sweep().await.unwrap();

    assert!(harness.wait_for_offers("order-1", 1).await);
    assert_eq!(harness.realtime.offered_couriers("order-1"), vec!["B"]);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_prunes_orders_assigned_elsewhere() {
    let harness = Harness::start(TestConfig::dispatcher(), &[]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(
        harness
            .wait_for_status("order-1", JobStatus::WaitingForCouriers)
            .await
    );

    harness.store.assign_externally("order-1", "Z");
    let report = harness.engine.trigger_recovery_sweep().await.unwrap();
    assert_eq!(report.discovered, 0);
    assert_eq!(report.pruned, 1);
    assert!(harness
        .engine
        .job_snapshot("order-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_periodic_recovery_until_shutdown() {
    let harness = Harness::start(TestConfig::dispatcher(), &[]);
    harness
        .submit(ReadyOrderBuilder::new().with_id("order-1").build())
        .await;
    assert!(
        harness
            .wait_for_status("order-1", JobStatus::WaitingForCouriers)
            .await
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = harness
        .engine
        .spawn_periodic_recovery(Duration::from_secs(30), shutdown_rx);

    harness
        .couriers
        .add_courier(CourierInfoBuilder::new().with_id("A").build());
    harness.connections.connect("A");

    sleep(Duration::from_secs(31)).await;
    assert!(harness.wait_for_offers("order-1", 1).await);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}
