use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dispatch_engine::DispatchEngine;
use dispatch_infrastructure::{BroadcastRealtimeChannel, InMemoryConnectionRegistry};

use crate::gateway::{courier_socket, vendor_socket};
use crate::handlers::{
    couriers::{courier_offline, courier_online},
    health::health_check,
    orders::{accept_order, get_job, list_queue, reject_order, submit_ready_order, trigger_sweep},
};

/// API应用状态
///
/// 连接注册表和实时通道与派单引擎持有的是同一个实例。
#[derive(Clone)]
pub struct AppState {
    pub engine: DispatchEngine,
    pub connections: Arc<InMemoryConnectionRegistry>,
    pub realtime: Arc<BroadcastRealtimeChannel>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 订单
        .route("/api/orders/ready", post(submit_ready_order))
        .route("/api/orders/{id}", get(get_job))
        .route("/api/orders/{id}/accept", post(accept_order))
        .route("/api/orders/{id}/reject", post(reject_order))
        .route("/api/queue", get(list_queue))
        .route("/api/recovery/sweep", post(trigger_sweep))
        // 骑手在线状态
        .route("/api/couriers/{id}/online", post(courier_online))
        .route("/api/couriers/{id}/offline", post(courier_offline))
        // 实时通道
        .route("/ws/couriers/{id}", get(courier_socket))
        .route("/ws/vendors/{id}", get(vendor_socket))
        .with_state(state)
}
