use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use dispatch_api::{create_app, gateway::handle_command, AppState};
use dispatch_core::DispatchEvent;
use dispatch_engine::{DispatchDependencies, DispatchEngine};
use dispatch_infrastructure::{
    BroadcastRealtimeChannel, InMemoryConnectionRegistry, MetricsCollector, RealtimeEnvelope,
    RealtimeTarget,
};
use dispatch_testing_utils::{
    available_couriers, MockCourierRegistry, MockOrderStore, MockRejectionCache,
    ReadyOrderBuilder, RecordingPushNotifier, TestConfig,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower::ServiceExt;

/// 与服务进程相同的连接注册表和实时通道，存储和注册表使用mock
struct Gateway {
    app: Router,
    engine: DispatchEngine,
    connections: Arc<InMemoryConnectionRegistry>,
    realtime: Arc<BroadcastRealtimeChannel>,
    store: Arc<MockOrderStore>,
}

impl Gateway {
    fn start(courier_ids: &[&str]) -> Self {
        let connections = Arc::new(InMemoryConnectionRegistry::new());
        let realtime = Arc::new(BroadcastRealtimeChannel::default());
        let store = Arc::new(MockOrderStore::new());

        let deps = DispatchDependencies {
            courier_registry: Arc::new(MockCourierRegistry::with_couriers(available_couriers(
                courier_ids,
            ))),
            connection_registry: connections.clone(),
            order_store: store.clone(),
            rejection_cache: Arc::new(MockRejectionCache::new()),
            realtime: realtime.clone(),
            push: Arc::new(RecordingPushNotifier::new()),
            metrics: Arc::new(MetricsCollector::new()),
        };
        let engine = DispatchEngine::start(deps, &TestConfig::dispatcher());
        let app = create_app(
            AppState {
                engine: engine.clone(),
                connections: connections.clone(),
                realtime: realtime.clone(),
            },
            true,
        );

        Self {
            app,
            engine,
            connections,
            realtime,
            store,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

/// 等待指定订单的下一条派单推送，返回投递目标
async fn next_offer(
    events: &mut broadcast::Receiver<RealtimeEnvelope>,
    order_id: &str,
) -> Option<RealtimeTarget> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let envelope = events.recv().await.ok()?;
            if let DispatchEvent::Offer { order_id: o, .. } = &envelope.event {
                if o == order_id {
                    return Some(envelope.target);
                }
            }
        }
    })
    .await
    .ok()
    .flatten()
}

#[tokio::test]
async fn test_online_courier_receives_offer_and_accepts() {
    let gateway = Gateway::start(&["A", "B"]);
    let mut events = gateway.realtime.subscribe();

    let (status, body) = gateway.post("/api/couriers/A/online", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["already_online"], false);
    assert!(gateway.connections.is_connected("A").await);

    let order = ReadyOrderBuilder::new().with_id("order-1").build();
    gateway.store.insert_ready(order.clone());
    let (status, body) = gateway
        .post("/api/orders/ready", serde_json::to_value(&order).unwrap())
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"], "enqueued");

    // B空闲但没有在线连接，只推送给A
    assert_eq!(
        next_offer(&mut events, "order-1").await,
        Some(RealtimeTarget::Courier("A".to_string()))
    );

    let (status, body) = gateway
        .post("/api/orders/order-1/accept", json!({ "courier_id": "A" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "assigned");
    assert_eq!(gateway.store.assigned_courier("order-1").as_deref(), Some("A"));
}

#[tokio::test]
async fn test_courier_coming_online_picks_up_waiting_order() {
    let gateway = Gateway::start(&["A"]);
    let mut events = gateway.realtime.subscribe();

    let order = ReadyOrderBuilder::new().with_id("order-1").build();
    gateway.store.insert_ready(order);

    let (status, body) = gateway.post("/api/couriers/A/online", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["requeued"], json!(["order-1"]));
    assert_eq!(
        next_offer(&mut events, "order-1").await,
        Some(RealtimeTarget::Courier("A".to_string()))
    );

    let (status, body) = gateway.get("/api/orders/order-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order_id"], "order-1");
}

#[tokio::test]
async fn test_socket_commands_reach_engine() {
    let gateway = Gateway::start(&["A"]);
    let mut events = gateway.realtime.subscribe();
    gateway.post("/api/couriers/A/online", json!({})).await;

    let order = ReadyOrderBuilder::new().with_id("order-1").build();
    gateway.store.insert_ready(order.clone());
    gateway
        .post("/api/orders/ready", serde_json::to_value(&order).unwrap())
        .await;
    assert!(next_offer(&mut events, "order-1").await.is_some());

    let reply = handle_command(
        &gateway.engine,
        "A",
        r#"{"type":"reject","order_id":"order-1"}"#,
    )
    .await;
    assert_eq!(
        serde_json::to_value(&reply).unwrap(),
        json!({
            "type": "reject_result",
            "order_id": "order-1",
            "outcome": { "recorded": { "attempt_ended": true } }
        })
    );

    let reply = handle_command(&gateway.engine, "A", "not json").await;
    assert_eq!(serde_json::to_value(&reply).unwrap()["type"], "error");
}

#[tokio::test]
async fn test_request_errors() {
    let gateway = Gateway::start(&["A"]);

    let (status, body) = gateway.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = gateway.get("/api/orders/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "NOT_FOUND");

    let (status, _) = gateway
        .post("/api/orders/order-1/accept", json!({ "courier_id": " " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    gateway.engine.shutdown().await;
    let order = ReadyOrderBuilder::new().with_id("order-2").build();
    let (status, body) = gateway
        .post("/api/orders/ready", serde_json::to_value(&order).unwrap())
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "ENGINE_STOPPED");
}
