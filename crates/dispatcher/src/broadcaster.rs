//! 派单推送
//!
//! 实时通道和移动推送都是尽力而为：单个骑手发送失败只记录日志和指标，
//! 不影响其他骑手，也不改变任务状态。

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use dispatch_core::{
    CourierId, DispatchEvent, DispatchJob, JobOffer, PushNotifier, RealtimeChannel, RemovalReason,
};
use dispatch_infrastructure::MetricsCollector;

/// 单轮推送的发送统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub realtime_delivered: usize,
    pub realtime_failed: usize,
    pub push_delivered: usize,
    pub push_failed: usize,
}

impl BroadcastReport {
    /// 两个通道都没有送达任何骑手
    pub fn reached_nobody(&self) -> bool {
        self.realtime_delivered == 0 && self.push_delivered == 0
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    realtime: Arc<dyn RealtimeChannel>,
    push: Arc<dyn PushNotifier>,
    metrics: Arc<MetricsCollector>,
    broadcast_fallback: bool,
}

impl Broadcaster {
    pub fn new(
        realtime: Arc<dyn RealtimeChannel>,
        push: Arc<dyn PushNotifier>,
        metrics: Arc<MetricsCollector>,
        broadcast_fallback: bool,
    ) -> Self {
        Self {
            realtime,
            push,
            metrics,
            broadcast_fallback,
        }
    }

    /// 在后台推送本轮派单，调用方不等待发送完成
    pub fn spawn_offers(&self, job: &DispatchJob) {
        let Some(offer) = JobOffer::for_job(job) else {
            warn!("订单 {} 没有推送截止时间，跳过推送", job.order_id);
            return;
        };
        let couriers = job.offered_couriers.clone();
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let order_id = offer.order_id.clone();
            let report = broadcaster.deliver_offers(offer, couriers).await;
            if report.reached_nobody() {
                warn!("订单 {} 本轮推送没有送达任何骑手: {:?}", order_id, report);
            }
        });
    }

    pub(crate) async fn deliver_offers(&self, offer: JobOffer, couriers: Vec<CourierId>) -> BroadcastReport {
        let event = DispatchEvent::Offer {
            order_id: offer.order_id.clone(),
            offer: offer.clone(),
        };

        let realtime = join_all(
            couriers
                .iter()
                .map(|courier_id| self.realtime.send_to_courier(courier_id, &event)),
        );
        let push = join_all(
            couriers
                .iter()
                .map(|courier_id| self.push.push_offer(courier_id, &offer)),
        );
        let (realtime_results, push_results) = tokio::join!(realtime, push);

        let mut report = BroadcastReport::default();
        for (courier_id, result) in couriers.iter().zip(realtime_results) {
            match result {
                Ok(()) => report.realtime_delivered += 1,
                Err(e) => {
                    report.realtime_failed += 1;
                    self.metrics.record_notification_failure("realtime");
                    warn!("向骑手 {} 推送订单 {} 失败: {}", courier_id, offer.order_id, e);
                }
            }
        }
        for (courier_id, result) in couriers.iter().zip(push_results) {
            match result {
                Ok(()) => report.push_delivered += 1,
                Err(e) => {
                    report.push_failed += 1;
                    self.metrics.record_notification_failure("push");
                    warn!("向骑手 {} 发送订单 {} 的移动推送失败: {}", courier_id, offer.order_id, e);
                }
            }
        }

        if self.broadcast_fallback {
            let broadcast = DispatchEvent::OfferBroadcast {
                order_id: offer.order_id.clone(),
                offer,
            };
            if let Err(e) = self.realtime.broadcast_to_couriers(&broadcast).await {
                self.metrics.record_notification_failure("realtime");
                warn!("订单 {} 的全体骑手广播失败: {}", broadcast.order_id(), e);
            }
        }

        debug!("派单推送完成: {:?}", report);
        report
    }

    /// 通知骑手订单已被撤回
    pub async fn retract(&self, order_id: &str, couriers: &[CourierId], reason: RemovalReason) {
        if couriers.is_empty() {
            return;
        }
        let event = DispatchEvent::JobRemoved {
            order_id: order_id.to_string(),
            reason,
        };
        let results = join_all(
            couriers
                .iter()
                .map(|courier_id| self.realtime.send_to_courier(courier_id, &event)),
        )
        .await;

        for (courier_id, result) in couriers.iter().zip(results) {
            if let Err(e) = result {
                self.metrics.record_notification_failure("realtime");
                warn!("向骑手 {} 撤回订单 {} 失败: {}", courier_id, order_id, e);
            }
        }
    }

    /// 向商家推送派单进展
    pub async fn notify_vendor(&self, vendor_id: &str, event: DispatchEvent) {
        if let Err(e) = self.realtime.send_to_vendor(vendor_id, &event).await {
            self.metrics.record_notification_failure("realtime");
            warn!(
                "向商家 {} 发送 {} 事件失败 (订单 {}): {}",
                vendor_id,
                event.name(),
                event.order_id(),
                e
            );
        }
    }
}
