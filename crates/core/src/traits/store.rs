use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{CourierId, ReadyOrder};
use crate::DispatchResult;

/// 订单存储接口
///
/// `try_assign` 是唯一的仲裁原语：同一订单只有一次调用能返回`true`。
/// 实现必须依赖存储自身的原子条件写入，而不是进程内的锁，
/// 因为多个派单实例可能同时运行。
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 条件写入订单归属：仅当订单仍处于待取货且未分配骑手时成功
    async fn try_assign(&self, order_id: &str, courier_id: &str) -> DispatchResult<bool>;

    /// 查询指定时间之后就绪、仍未分配骑手的订单，按就绪时间升序
    async fn find_unassigned_ready_orders(
        &self,
        since: DateTime<Utc>,
    ) -> DispatchResult<Vec<ReadyOrder>>;
}

/// 拒单缓存接口，带过期时间的键值存储，用于跨进程重启保留拒单记录
#[async_trait]
pub trait RejectionCache: Send + Sync {
    /// 读取订单的拒单骑手集合，不存在时返回空集合
    async fn load(&self, order_id: &str) -> DispatchResult<HashSet<CourierId>>;

    /// 追加一条拒单记录并刷新过期时间
    async fn add(&self, order_id: &str, courier_id: &str, ttl: Duration) -> DispatchResult<()>;

    /// 删除订单的拒单记录
    async fn clear(&self, order_id: &str) -> DispatchResult<()>;
}
