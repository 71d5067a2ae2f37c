//! 派单循环
//!
//! 同一时刻最多运行一个派单循环：由排队器在队列从空变为非空时通知引擎启动，
//! 队列取空后自行退出。循环负责所有I/O，再把结果报告给排队器。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use dispatch_core::{
    CourierId, DispatchError, DispatchEvent, DispatchJob, DispatchResult, RejectionCache,
};
use dispatch_infrastructure::MetricsCollector;

use crate::broadcaster::Broadcaster;
use crate::candidate_selector::CandidateSelector;
use crate::sequencer::{AttemptStart, FinishedAttempt, SequencerHandle};
use crate::state_machine::{AttemptEnd, AttemptOutcome};

#[derive(Clone)]
pub struct DispatchLoop {
    sequencer: SequencerHandle,
    selector: Arc<CandidateSelector>,
    broadcaster: Broadcaster,
    rejection_cache: Arc<dyn RejectionCache>,
    metrics: Arc<MetricsCollector>,
    offer_timeout: Duration,
    inter_job_delay: Duration,
}

impl DispatchLoop {
    pub fn new(
        sequencer: SequencerHandle,
        selector: Arc<CandidateSelector>,
        broadcaster: Broadcaster,
        rejection_cache: Arc<dyn RejectionCache>,
        metrics: Arc<MetricsCollector>,
        offer_timeout: Duration,
        inter_job_delay: Duration,
    ) -> Self {
        Self {
            sequencer,
            selector,
            broadcaster,
            rejection_cache,
            metrics,
            offer_timeout,
            inter_job_delay,
        }
    }

    pub async fn run(self) {
        debug!("派单循环启动");
        loop {
            let job = match self.sequencer.next_job().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(_) => {
                    info!("排队器已停止，派单循环退出");
                    return;
                }
            };

            let order_id = job.order_id.clone();
            match self.run_attempt(job).await {
                Ok(outcome) => {
                    debug!("订单 {} 本轮派单结果: {:?}", order_id, outcome);
                    if outcome.requires_cooldown() {
                        sleep(self.inter_job_delay).await;
                    }
                }
                Err(DispatchError::EngineStopped) => {
                    info!("排队器已停止，派单循环退出");
                    return;
                }
                Err(e) => {
                    error!("订单 {} 派单失败: {}", order_id, e);
                }
            }
        }
        debug!("派单队列已清空，派单循环退出");
    }

    async fn run_attempt(&self, job: DispatchJob) -> DispatchResult<AttemptOutcome> {
        let order_id = job.order_id.clone();

        let mut rejected = job.rejected_couriers.clone();
        let known_rejections = match self.rejection_cache.load(&order_id).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!("读取订单 {} 的拒单缓存失败，仅使用内存记录: {}", order_id, e);
                HashSet::new()
            }
        };
        rejected.extend(known_rejections.iter().cloned());

        let candidates = match self.selector.select(&job, &rejected).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("订单 {} 筛选候选骑手失败: {}", order_id, e);
                Vec::new()
            }
        };

        if candidates.is_empty() {
            return self.park_without_candidates(&job).await;
        }

        self.offer(order_id, candidates, known_rejections).await
    }

    async fn park_without_candidates(&self, job: &DispatchJob) -> DispatchResult<AttemptOutcome> {
        let Some(parked) = self.sequencer.park(&job.order_id).await? else {
            return Ok(AttemptOutcome::Skipped);
        };
        info!("订单 {} 没有可用骑手，转入等待", parked.order_id);
        self.metrics.record_job_parked(&parked.order_id, parked.attempts);

        self.broadcaster
            .notify_vendor(
                &parked.vendor_id,
                DispatchEvent::NoCouriersAvailable {
                    order_id: parked.order_id.clone(),
                },
            )
            .await;
        self.notify_waiting(&parked).await;

        Ok(AttemptOutcome::Parked { offered: false })
    }

    async fn offer(
        &self,
        order_id: String,
        candidates: Vec<CourierId>,
        known_rejections: HashSet<CourierId>,
    ) -> DispatchResult<AttemptOutcome> {
        let timeout = chrono::Duration::from_std(self.offer_timeout)
            .map_err(|e| DispatchError::Internal(format!("派单超时时间无效: {}", e)))?;
        let deadline = Instant::now() + self.offer_timeout;
        let (signal, attempt_ended) = oneshot::channel();

        let Some(job) = self
            .sequencer
            .begin_attempt(AttemptStart {
                order_id: order_id.clone(),
                offered: candidates,
                expires_at: Utc::now() + timeout,
                deadline,
                known_rejections,
                signal,
            })
            .await?
        else {
            debug!("订单 {} 已不在派单中，跳过推送", order_id);
            return Ok(AttemptOutcome::Skipped);
        };

        self.metrics
            .record_attempt(&order_id, job.attempts, job.offered_couriers.len());
        info!(
            "订单 {} 第 {} 轮派单，推送给 {} 名骑手",
            order_id,
            job.attempts,
            job.offered_couriers.len()
        );

        let end = if job.offered_couriers.is_empty() {
            // 开始推送前候选骑手已全部拒单
            AttemptEnd::AllRejected
        } else {
            self.broadcaster.spawn_offers(&job);
            tokio::select! {
                received = attempt_ended => received.unwrap_or(AttemptEnd::Expired),
                _ = sleep_until(deadline) => AttemptEnd::Expired,
            }
        };

        if end == AttemptEnd::Assigned {
            return Ok(AttemptOutcome::Assigned);
        }
        if end == AttemptEnd::AllRejected {
            info!("订单 {} 本轮骑手全部拒单，提前结束", order_id);
        }

        match self.sequencer.finish_attempt(&order_id, end).await? {
            FinishedAttempt::Resolved => Ok(AttemptOutcome::Skipped),
            FinishedAttempt::Retried { attempts } => {
                debug!("订单 {} 第 {} 轮无人接单，放回队首", order_id, attempts);
                Ok(AttemptOutcome::Retried)
            }
            FinishedAttempt::Parked(parked) => {
                warn!(
                    "订单 {} 经过 {} 轮派单仍无人接单，转入等待",
                    order_id, parked.attempts
                );
                self.metrics.record_job_parked(&order_id, parked.attempts);
                self.notify_waiting(&parked).await;
                Ok(AttemptOutcome::Parked { offered: true })
            }
        }
    }

    async fn notify_waiting(&self, parked: &DispatchJob) {
        self.broadcaster
            .notify_vendor(
                &parked.vendor_id,
                DispatchEvent::WaitingForCouriers {
                    order_id: parked.order_id.clone(),
                    attempts: parked.attempts,
                },
            )
            .await;
    }
}
