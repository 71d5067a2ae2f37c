//! 骑手可用性与可达性查询接口
//!
//! - `CourierRegistry` 回答"谁在线、有定位、手上没有进行中的订单"
//! - `ConnectionRegistry` 回答"谁此刻能通过实时通道收到消息"
//!
//! 派单只会推送给两者的交集。

use std::collections::HashSet;

use async_trait::async_trait;

use crate::models::{CourierId, CourierInfo};
use crate::DispatchResult;

/// 骑手注册表接口
#[async_trait]
pub trait CourierRegistry: Send + Sync {
    /// 查询在线、有定位且未携带进行中订单的骑手，排除指定集合
    async fn find_available_couriers(
        &self,
        excluding: &HashSet<CourierId>,
    ) -> DispatchResult<Vec<CourierInfo>>;

    /// 标记骑手已携带订单，不再接收新的派单
    async fn mark_busy(&self, courier_id: &str, order_id: &str) -> DispatchResult<()>;
}

/// 实时连接注册表接口
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// 当前通过实时通道可达的骑手
    async fn connected_couriers(&self) -> DispatchResult<HashSet<CourierId>>;
}
