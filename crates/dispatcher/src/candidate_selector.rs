use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use dispatch_core::{
    CourierId, CourierInfo, CourierRegistry, ConnectionRegistry, DispatchJob, DispatchResult,
    SelectionStrategyKind,
};

/// 候选骑手排序策略
pub trait SelectionStrategy: Send + Sync {
    /// 对已过滤的候选骑手排序，排在前面的优先推送
    fn rank(&self, job: &DispatchJob, couriers: Vec<CourierInfo>) -> Vec<CourierInfo>;

    fn name(&self) -> &str;
}

/// 保持注册表返回顺序
pub struct StableOrderStrategy;

/// 按到取货点的距离由近到远排序，位置未知的骑手排在最后
pub struct NearestFirstStrategy;

impl SelectionStrategy for StableOrderStrategy {
    fn rank(&self, _job: &DispatchJob, couriers: Vec<CourierInfo>) -> Vec<CourierInfo> {
        couriers
    }

    fn name(&self) -> &str {
        "Stable"
    }
}

impl SelectionStrategy for NearestFirstStrategy {
    fn rank(&self, job: &DispatchJob, mut couriers: Vec<CourierInfo>) -> Vec<CourierInfo> {
        let Some(pickup) = job.payload.pickup_location else {
            debug!("订单 {} 缺少取货坐标，保持注册表顺序", job.order_id);
            return couriers;
        };

        // sort_by是稳定排序，距离相同的骑手保持原有顺序
        couriers.sort_by(|a, b| match (a.distance_to(&pickup), b.distance_to(&pickup)) {
            (Some(da), Some(db)) => da.partial_cmp(&db).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        couriers
    }

    fn name(&self) -> &str {
        "Nearest"
    }
}

/// 根据配置创建排序策略
pub fn strategy_for(kind: SelectionStrategyKind) -> Arc<dyn SelectionStrategy> {
    match kind {
        SelectionStrategyKind::Stable => Arc::new(StableOrderStrategy),
        SelectionStrategyKind::Nearest => Arc::new(NearestFirstStrategy),
    }
}

/// 候选骑手筛选
///
/// 候选集合 = 注册表中空闲的骑手 ∩ 当前在线连接 − 已拒单骑手，
/// 按策略排序后截取前`max_fan_out`个。
pub struct CandidateSelector {
    courier_registry: Arc<dyn CourierRegistry>,
    connection_registry: Arc<dyn ConnectionRegistry>,
    strategy: Arc<dyn SelectionStrategy>,
    max_fan_out: usize,
}

impl CandidateSelector {
    pub fn new(
        courier_registry: Arc<dyn CourierRegistry>,
        connection_registry: Arc<dyn ConnectionRegistry>,
        strategy: Arc<dyn SelectionStrategy>,
        max_fan_out: usize,
    ) -> Self {
        Self {
            courier_registry,
            connection_registry,
            strategy,
            max_fan_out,
        }
    }

    pub async fn select(
        &self,
        job: &DispatchJob,
        rejected: &HashSet<CourierId>,
    ) -> DispatchResult<Vec<CourierId>> {
        let available = self
            .courier_registry
            .find_available_couriers(rejected)
            .await?;
        let reachable = self.connection_registry.connected_couriers().await?;

        let mut seen = HashSet::new();
        let eligible: Vec<CourierInfo> = available
            .into_iter()
            .filter(|courier| {
                courier.is_available()
                    && reachable.contains(&courier.id)
                    && !rejected.contains(&courier.id)
                    && !job.has_rejected(&courier.id)
                    && seen.insert(courier.id.clone())
            })
            .collect();

        let eligible_count = eligible.len();
        let candidates: Vec<CourierId> = self
            .strategy
            .rank(job, eligible)
            .into_iter()
            .take(self.max_fan_out)
            .map(|courier| courier.id)
            .collect();

        debug!(
            "订单 {} 候选骑手: {}/{} (策略: {})",
            job.order_id,
            candidates.len(),
            eligible_count,
            self.strategy.name()
        );
        Ok(candidates)
    }
}
