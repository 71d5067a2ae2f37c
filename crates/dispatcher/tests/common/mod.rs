#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use dispatch_core::{DispatchEvent, DispatcherConfig, JobStatus, ReadyOrder, RemovalReason};
use dispatch_engine::{DispatchDependencies, DispatchEngine, SubmitOutcome};
use dispatch_infrastructure::MetricsCollector;
use dispatch_testing_utils::{
    available_couriers, MockConnectionRegistry, MockCourierRegistry, MockOrderStore,
    MockRejectionCache, RecordingPushNotifier, RecordingRealtimeChannel, TestEnv,
};

pub const WAIT: Duration = Duration::from_secs(600);

/// 使用内存mock组装的派单引擎
pub struct Harness {
    pub engine: DispatchEngine,
    pub couriers: Arc<MockCourierRegistry>,
    pub connections: Arc<MockConnectionRegistry>,
    pub store: Arc<MockOrderStore>,
    pub cache: Arc<MockRejectionCache>,
    pub realtime: Arc<RecordingRealtimeChannel>,
    pub push: Arc<RecordingPushNotifier>,
}

impl Harness {
    /// 启动引擎，给定的骑手全部空闲且在线
    pub fn start(config: DispatcherConfig, courier_ids: &[&str]) -> Self {
        let couriers = Arc::new(MockCourierRegistry::with_couriers(available_couriers(
            courier_ids,
        )));
        let connections = Arc::new(MockConnectionRegistry::with_connected(courier_ids));
        let store = Arc::new(MockOrderStore::new());
        let cache = Arc::new(MockRejectionCache::new());
        let realtime = Arc::new(RecordingRealtimeChannel::new());
        let push = Arc::new(RecordingPushNotifier::new());

        let deps = DispatchDependencies {
            courier_registry: couriers.clone(),
            connection_registry: connections.clone(),
            order_store: store.clone(),
            rejection_cache: cache.clone(),
            realtime: realtime.clone(),
            push: push.clone(),
            metrics: Arc::new(MetricsCollector::new()),
        };
        let engine = DispatchEngine::start(deps, &config);

        Self {
            engine,
            couriers,
            connections,
            store,
            cache,
            realtime,
            push,
        }
    }

    /// 订单写入存储后提交派单
    pub async fn submit(&self, order: ReadyOrder) -> SubmitOutcome {
        self.store.insert_ready(order.clone());
        self.engine.submit_job(order).await.unwrap()
    }

    pub async fn wait_for_offers(&self, order_id: &str, count: usize) -> bool {
        TestEnv::wait_for(
            move || async move { self.realtime.offered_couriers(order_id).len() >= count },
            WAIT,
        )
        .await
    }

    pub async fn wait_for_status(&self, order_id: &str, status: JobStatus) -> bool {
        TestEnv::wait_for_with_interval(
            move || async move {
                self.engine
                    .job_snapshot(order_id)
                    .await
                    .unwrap()
                    .is_some_and(|job| job.status == status)
            },
            WAIT,
            Duration::from_millis(100),
        )
        .await
    }

    /// 骑手收到的撤回事件
    pub fn removals(&self, courier_id: &str, order_id: &str) -> Vec<RemovalReason> {
        self.realtime
            .courier_events(courier_id)
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::JobRemoved {
                    order_id: o,
                    reason,
                } if o == order_id => Some(reason),
                _ => None,
            })
            .collect()
    }

    /// 骑手按时间顺序收到推送的订单
    pub fn offer_sequence(&self, courier_id: &str) -> Vec<String> {
        self.realtime
            .courier_events(courier_id)
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::Offer { order_id, .. } => Some(order_id),
                _ => None,
            })
            .collect()
    }
}
