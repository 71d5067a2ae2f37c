use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use dispatch_core::{DispatchJob, DispatchResult, OrderId, OrderStore, RejectionCache};

/// 恢复扫描报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// 订单存储中未分配的待取货订单数
    pub discovered: usize,
    /// 新加入队列或重新入队的订单
    pub enqueued: Vec<OrderId>,
    /// 已在排队或派单中而跳过的订单数
    pub already_tracked: usize,
    /// 已被其他途径分配而清理的本地等待任务数
    pub pruned: usize,
    pub recovery_duration_ms: u64,
}

/// 恢复服务接口
#[async_trait]
pub trait RecoveryService: Send + Sync {
    /// 查找恢复窗口内仍未分配的订单，按就绪时间从早到晚返回新建的派单任务
    async fn discover_unassigned_jobs(&self) -> DispatchResult<Vec<DispatchJob>>;
}

/// 基于订单存储的恢复服务
pub struct OrderRecoveryService {
    order_store: Arc<dyn OrderStore>,
    rejection_cache: Arc<dyn RejectionCache>,
    window: chrono::Duration,
}

impl OrderRecoveryService {
    pub fn new(
        order_store: Arc<dyn OrderStore>,
        rejection_cache: Arc<dyn RejectionCache>,
        window: chrono::Duration,
    ) -> Self {
        Self {
            order_store,
            rejection_cache,
            window,
        }
    }
}

#[async_trait]
impl RecoveryService for OrderRecoveryService {
    async fn discover_unassigned_jobs(&self) -> DispatchResult<Vec<DispatchJob>> {
        let since = Utc::now() - self.window;
        let mut orders = self.order_store.find_unassigned_ready_orders(since).await?;
        orders.sort_by_key(|order| order.ready_at);
        info!("恢复扫描发现 {} 个未分配订单", orders.len());

        let mut jobs = Vec::with_capacity(orders.len());
        let mut seen = HashSet::new();
        for order in orders {
            if !seen.insert(order.order_id.clone()) {
                continue;
            }
            let rejected = match self.rejection_cache.load(&order.order_id).await {
                Ok(rejected) => rejected,
                Err(e) => {
                    warn!("读取订单 {} 的拒单缓存失败: {}", order.order_id, e);
                    HashSet::new()
                }
            };
            debug!(
                "恢复订单 {}，已有 {} 条拒单记录",
                order.order_id,
                rejected.len()
            );
            jobs.push(DispatchJob::new(order).with_rejections(rejected));
        }
        Ok(jobs)
    }
}
