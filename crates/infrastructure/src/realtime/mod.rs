//! 实时通道
//!
//! 派单引擎把事件投递到进程内广播通道，由WebSocket层订阅后按目标转发。
//! WebSocket层同时负责维护在线连接注册表。

use std::collections::HashSet;

use async_trait::async_trait;
use dispatch_core::{
    ConnectionRegistry, CourierId, DispatchError, DispatchEvent, DispatchResult, RealtimeChannel,
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// 消息投递目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeTarget {
    Courier(CourierId),
    AllCouriers,
    Vendor(String),
}

/// 带投递目标的事件
#[derive(Debug, Clone)]
pub struct RealtimeEnvelope {
    pub target: RealtimeTarget,
    pub event: DispatchEvent,
}

/// 基于tokio广播通道的实时消息发布
#[derive(Debug, Clone)]
pub struct BroadcastRealtimeChannel {
    sender: broadcast::Sender<RealtimeEnvelope>,
}

impl BroadcastRealtimeChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 订阅所有待投递事件
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEnvelope> {
        self.sender.subscribe()
    }

    fn publish(&self, target: RealtimeTarget, event: &DispatchEvent) -> DispatchResult<()> {
        let envelope = RealtimeEnvelope {
            target,
            event: event.clone(),
        };
        let receivers = self
            .sender
            .send(envelope)
            .map_err(|_| DispatchError::Notification("实时通道没有订阅者".to_string()))?;
        debug!("实时事件 {} 已投递给 {} 个订阅者", event.name(), receivers);
        Ok(())
    }
}

impl Default for BroadcastRealtimeChannel {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl RealtimeChannel for BroadcastRealtimeChannel {
    async fn send_to_courier(&self, courier_id: &str, event: &DispatchEvent) -> DispatchResult<()> {
        self.publish(RealtimeTarget::Courier(courier_id.to_string()), event)
    }

    async fn broadcast_to_couriers(&self, event: &DispatchEvent) -> DispatchResult<()> {
        self.publish(RealtimeTarget::AllCouriers, event)
    }

    async fn send_to_vendor(&self, vendor_id: &str, event: &DispatchEvent) -> DispatchResult<()> {
        self.publish(RealtimeTarget::Vendor(vendor_id.to_string()), event)
    }
}

/// 进程内在线连接注册表
#[derive(Debug, Default)]
pub struct InMemoryConnectionRegistry {
    connected: RwLock<HashSet<CourierId>>,
}

impl InMemoryConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录骑手建立连接，返回是否为新连接
    pub async fn connect(&self, courier_id: &str) -> bool {
        let inserted = self.connected.write().await.insert(courier_id.to_string());
        if inserted {
            info!("骑手 {} 已连接实时通道", courier_id);
        }
        inserted
    }

    pub async fn disconnect(&self, courier_id: &str) -> bool {
        let removed = self.connected.write().await.remove(courier_id);
        if removed {
            info!("骑手 {} 已断开实时通道", courier_id);
        }
        removed
    }

    pub async fn is_connected(&self, courier_id: &str) -> bool {
        self.connected.read().await.contains(courier_id)
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn connected_couriers(&self) -> DispatchResult<HashSet<CourierId>> {
        Ok(self.connected.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::RemovalReason;

    #[tokio::test]
    async fn test_channel_routes_by_target() {
        let channel = BroadcastRealtimeChannel::new(16);
        let mut rx = channel.subscribe();
        let event = DispatchEvent::JobRemoved {
            order_id: "o-1".to_string(),
            reason: RemovalReason::AlreadyAssigned,
        };

        channel.send_to_courier("c-1", &event).await.unwrap();
        channel.send_to_vendor("v-1", &event).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.target, RealtimeTarget::Courier("c-1".to_string()));
        assert_eq!(first.event, event);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.target, RealtimeTarget::Vendor("v-1".to_string()));
    }

    #[tokio::test]
    async fn test_channel_without_subscribers_fails() {
        let channel = BroadcastRealtimeChannel::new(16);
        let event = DispatchEvent::NoCouriersAvailable {
            order_id: "o-1".to_string(),
        };
        assert!(matches!(
            channel.broadcast_to_couriers(&event).await,
            Err(DispatchError::Notification(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_registry() {
        let registry = InMemoryConnectionRegistry::new();
        assert!(registry.connect("c-1").await);
        assert!(!registry.connect("c-1").await);
        registry.connect("c-2").await;
        assert!(registry.disconnect("c-2").await);

        let connected = registry.connected_couriers().await.unwrap();
        assert_eq!(connected, HashSet::from(["c-1".to_string()]));
        assert!(registry.is_connected("c-1").await);
    }
}
