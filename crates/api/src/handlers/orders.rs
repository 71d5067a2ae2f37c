use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use dispatch_core::ReadyOrder;
use serde::Deserialize;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    response::{accepted, success},
    routes::AppState,
};

/// 骑手接单或拒单请求
#[derive(Debug, Deserialize)]
pub struct CourierDecisionRequest {
    pub courier_id: String,
}

impl CourierDecisionRequest {
    fn courier_id(&self) -> ApiResult<&str> {
        let courier_id = self.courier_id.trim();
        if courier_id.is_empty() {
            return Err(ApiError::BadRequest("courier_id不能为空".to_string()));
        }
        Ok(courier_id)
    }
}

/// 订单可以取货，提交派单
pub async fn submit_ready_order(
    State(state): State<AppState>,
    Json(order): Json<ReadyOrder>,
) -> ApiResult<impl IntoResponse> {
    if order.order_id.trim().is_empty() {
        return Err(ApiError::BadRequest("order_id不能为空".to_string()));
    }
    info!("商家 {} 的订单 {} 可以取货", order.vendor_id, order.order_id);
    let outcome = state.engine.submit_job(order).await?;
    Ok(accepted(outcome))
}

/// 查询本地跟踪的派单任务
pub async fn get_job(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .engine
        .job_snapshot(&order_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(success(job))
}

pub async fn accept_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(request): Json<CourierDecisionRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .engine
        .courier_accepted(&order_id, request.courier_id()?)
        .await?;
    Ok(success(outcome))
}

pub async fn reject_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(request): Json<CourierDecisionRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .engine
        .courier_rejected(&order_id, request.courier_id()?)
        .await?;
    Ok(success(outcome))
}

/// 排队中的订单，按出队顺序
pub async fn list_queue(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.engine.queued_orders().await?))
}

pub async fn trigger_sweep(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.engine.trigger_recovery_sweep().await?))
}
