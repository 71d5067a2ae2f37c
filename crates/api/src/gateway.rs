//! WebSocket接入
//!
//! 骑手连接期间记为在线，断开后移出连接注册表。实时通道上发给该骑手或全体骑手的事件
//! 以JSON文本帧转发，骑手也可以在同一连接上发送接单和拒单指令。
//! 商家连接只接收自己订单的派单进展。

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use dispatch_engine::{AcceptOutcome, DispatchEngine, RejectOutcome};
use dispatch_infrastructure::RealtimeTarget;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::routes::AppState;

/// 骑手通过WebSocket发送的指令
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CourierCommand {
    Accept { order_id: String },
    Reject { order_id: String },
}

/// 指令的处理结果
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandReply {
    AcceptResult {
        order_id: String,
        outcome: AcceptOutcome,
    },
    RejectResult {
        order_id: String,
        outcome: RejectOutcome,
    },
    Error {
        message: String,
    },
}

pub fn delivers_to_courier(target: &RealtimeTarget, courier_id: &str) -> bool {
    match target {
        RealtimeTarget::Courier(id) => id == courier_id,
        RealtimeTarget::AllCouriers => true,
        RealtimeTarget::Vendor(_) => false,
    }
}

pub fn delivers_to_vendor(target: &RealtimeTarget, vendor_id: &str) -> bool {
    matches!(target, RealtimeTarget::Vendor(id) if id == vendor_id)
}

/// 解析并执行一条骑手指令
pub async fn handle_command(engine: &DispatchEngine, courier_id: &str, text: &str) -> CommandReply {
    let command = match serde_json::from_str::<CourierCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            return CommandReply::Error {
                message: format!("无法解析指令: {}", e),
            }
        }
    };

    match command {
        CourierCommand::Accept { order_id } => {
            match engine.courier_accepted(&order_id, courier_id).await {
                Ok(outcome) => CommandReply::AcceptResult { order_id, outcome },
                Err(e) => CommandReply::Error {
                    message: e.to_string(),
                },
            }
        }
        CourierCommand::Reject { order_id } => {
            match engine.courier_rejected(&order_id, courier_id).await {
                Ok(outcome) => CommandReply::RejectResult { order_id, outcome },
                Err(e) => CommandReply::Error {
                    message: e.to_string(),
                },
            }
        }
    }
}

pub async fn courier_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(courier_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| courier_session(state, socket, courier_id))
}

pub async fn vendor_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(vendor_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| vendor_session(state, socket, vendor_id))
}

async fn courier_session(state: AppState, mut socket: WebSocket, courier_id: String) {
    // 先订阅再上线，上线扫描触发的推送不会丢失
    let mut events = state.realtime.subscribe();
    state.connections.connect(&courier_id).await;
    if let Err(e) = state.engine.courier_came_online(&courier_id).await {
        warn!("骑手 {} 上线后的恢复扫描失败: {}", courier_id, e);
    }

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(envelope) => {
                    if !delivers_to_courier(&envelope.target, &courier_id) {
                        continue;
                    }
                    if send_json(&mut socket, &envelope.event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("骑手 {} 的连接处理落后，跳过 {} 条事件", courier_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_command(&state.engine, &courier_id, text.as_str()).await;
                    if send_json(&mut socket, &reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.connections.disconnect(&courier_id).await;
    debug!("骑手 {} 的WebSocket会话结束", courier_id);
}

async fn vendor_session(state: AppState, mut socket: WebSocket, vendor_id: String) {
    let mut events = state.realtime.subscribe();
    info!("商家 {} 已连接实时通道", vendor_id);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(envelope) => {
                    if !delivers_to_vendor(&envelope.target, &vendor_id) {
                        continue;
                    }
                    if send_json(&mut socket, &envelope.event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("商家 {} 的连接处理落后，跳过 {} 条事件", vendor_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("商家 {} 已断开实时通道", vendor_id);
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(payload) => socket.send(Message::Text(payload.into())).await,
        Err(e) => {
            warn!("序列化实时消息失败: {}", e);
            Ok(())
        }
    }
}
