use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;

use crate::{error::ApiResult, response::success, routes::AppState};

#[derive(Debug, Serialize)]
pub struct OnlineResponse {
    pub courier_id: String,
    /// 此前是否已在线
    pub already_online: bool,
    /// 上线触发的恢复扫描重新入队的订单
    pub requeued: Vec<String>,
}

/// 骑手上线
///
/// 记入连接注册表后触发恢复扫描，让等待骑手的订单重新入队。
pub async fn courier_online(
    State(state): State<AppState>,
    Path(courier_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let newly_connected = state.connections.connect(&courier_id).await;
    let report = state.engine.courier_came_online(&courier_id).await?;
    Ok(success(OnlineResponse {
        courier_id,
        already_online: !newly_connected,
        requeued: report.enqueued,
    }))
}

pub async fn courier_offline(
    State(state): State<AppState>,
    Path(courier_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let was_online = state.connections.disconnect(&courier_id).await;
    Ok(success(was_online))
}
