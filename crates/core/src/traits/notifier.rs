use async_trait::async_trait;

use crate::models::{DispatchEvent, JobOffer};
use crate::DispatchResult;

/// 实时消息通道
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// 发送给单个骑手
    async fn send_to_courier(&self, courier_id: &str, event: &DispatchEvent) -> DispatchResult<()>;

    /// 发送给所有在线骑手
    async fn broadcast_to_couriers(&self, event: &DispatchEvent) -> DispatchResult<()>;

    /// 发送给商家
    async fn send_to_vendor(&self, vendor_id: &str, event: &DispatchEvent) -> DispatchResult<()>;
}

/// 推送通知
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn push_offer(&self, courier_id: &str, offer: &JobOffer) -> DispatchResult<()>;
}
