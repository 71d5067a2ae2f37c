//! # Dispatch API
//!
//! 骑手端和商家端的接入网关，基于Axum构建。
//!
//! ## API 端点
//!
//! ### 订单
//! - `POST /api/orders/ready` - 商家标记订单可取货，进入派单队列
//! - `GET /api/orders/{id}` - 查询本地跟踪的派单任务
//! - `POST /api/orders/{id}/accept` - 骑手接单
//! - `POST /api/orders/{id}/reject` - 骑手拒单
//! - `GET /api/queue` - 当前排队中的订单
//! - `POST /api/recovery/sweep` - 手动触发恢复扫描
//!
//! ### 骑手
//! - `POST /api/couriers/{id}/online` - 骑手上线
//! - `POST /api/couriers/{id}/offline` - 骑手下线
//!
//! ### 实时通道
//! - `GET /ws/couriers/{id}` - 骑手WebSocket，连接期间视为在线，可直接发送接单和拒单指令
//! - `GET /ws/vendors/{id}` - 商家WebSocket，接收派单进展
//!
//! ## 错误响应
//!
//! ```json
//! {
//!   "error": {
//!     "message": "派单引擎已停止",
//!     "type": "ENGINE_STOPPED",
//!     "code": 503,
//!     "suggestions": ["服务正在关闭，请稍后重试"],
//!     "timestamp": "2024-01-01T00:00:00Z"
//!   }
//! }
//! ```

pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};

pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, cors_enabled: bool) -> Router {
    let app = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if cors_enabled {
        app.layer(cors_layer())
    } else {
        app
    }
}
