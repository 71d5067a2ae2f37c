//! 抢单仲裁
//!
//! 本地任务表只做快速拒绝，订单归属由订单存储的条件写入决定，
//! 多个实例同时处理同一订单时也只会有一个骑手成功。

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use dispatch_core::{
    CourierRegistry, DispatchEvent, DispatchResult, OrderStore, RejectionCache, RemovalReason,
};
use dispatch_infrastructure::MetricsCollector;

use crate::broadcaster::Broadcaster;
use crate::sequencer::{AcceptCheck, SequencerHandle};

/// 接单请求的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptOutcome {
    /// 抢单成功
    Assigned,
    /// 订单已被其他骑手抢走
    AlreadyAssigned,
    /// 本轮未向该骑手推送，或该骑手已拒单
    NotOffered,
    /// 本轮已结束
    OfferExpired,
}

pub struct Arbiter {
    sequencer: SequencerHandle,
    order_store: Arc<dyn OrderStore>,
    courier_registry: Arc<dyn CourierRegistry>,
    rejection_cache: Arc<dyn RejectionCache>,
    broadcaster: Broadcaster,
    metrics: Arc<MetricsCollector>,
}

impl Arbiter {
    pub fn new(
        sequencer: SequencerHandle,
        order_store: Arc<dyn OrderStore>,
        courier_registry: Arc<dyn CourierRegistry>,
        rejection_cache: Arc<dyn RejectionCache>,
        broadcaster: Broadcaster,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            sequencer,
            order_store,
            courier_registry,
            rejection_cache,
            broadcaster,
            metrics,
        }
    }

    /// 处理骑手接单
    ///
    /// 订单存储写入失败时返回错误，此时本地状态不变。
    /// 条件写入成功后一律返回`Assigned`。
    pub async fn accept(&self, order_id: &str, courier_id: &str) -> DispatchResult<AcceptOutcome> {
        match self.sequencer.check_accept(order_id, courier_id).await? {
            AcceptCheck::Eligible | AcceptCheck::Untracked => {}
            AcceptCheck::NotOffered | AcceptCheck::AlreadyRejected => {
                debug!("骑手 {} 未收到订单 {} 的本轮推送", courier_id, order_id);
                return Ok(AcceptOutcome::NotOffered);
            }
            AcceptCheck::Expired => {
                debug!("骑手 {} 接单时订单 {} 的本轮推送已结束", courier_id, order_id);
                return Ok(AcceptOutcome::OfferExpired);
            }
        }

        if !self.order_store.try_assign(order_id, courier_id).await? {
            info!("骑手 {} 抢单失败，订单 {} 已被分配", courier_id, order_id);
            self.metrics.record_arbitration_conflict();
            self.broadcaster
                .retract(
                    order_id,
                    &[courier_id.to_string()],
                    RemovalReason::AlreadyAssigned,
                )
                .await;
            return Ok(AcceptOutcome::AlreadyAssigned);
        }

        // 订单存储已经确认归属，本地状态同步失败不能改变接单结果
        let assigned = match self.sequencer.confirm_assigned(order_id, courier_id).await {
            Ok(assigned) => assigned,
            Err(e) => {
                error!(
                    "订单 {} 已分配给骑手 {}，但同步本地任务表失败: {}",
                    order_id, courier_id, e
                );
                None
            }
        };

        if let Err(e) = self.courier_registry.mark_busy(courier_id, order_id).await {
            error!("标记骑手 {} 为忙碌失败 (订单 {}): {}", courier_id, order_id, e);
        }
        if let Err(e) = self.rejection_cache.clear(order_id).await {
            warn!("清理订单 {} 的拒单缓存失败: {}", order_id, e);
        }

        match assigned {
            Some(assigned) => {
                let waited = (Utc::now() - assigned.job.created_at)
                    .to_std()
                    .map(|d| d.as_secs_f64())
                    .unwrap_or_default();
                self.metrics.record_assignment(order_id, courier_id, waited);

                self.broadcaster
                    .retract(order_id, &assigned.losers, RemovalReason::AcceptedByAnother)
                    .await;
                self.broadcaster
                    .notify_vendor(
                        &assigned.job.vendor_id,
                        DispatchEvent::JobAssigned {
                            order_id: order_id.to_string(),
                            courier_id: courier_id.to_string(),
                        },
                    )
                    .await;
            }
            None => {
                info!(
                    "骑手 {} 抢到未在本地跟踪的订单 {}",
                    courier_id, order_id
                );
            }
        }

        Ok(AcceptOutcome::Assigned)
    }
}
