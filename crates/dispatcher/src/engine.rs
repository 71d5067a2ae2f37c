//! 派单引擎
//!
//! 对外暴露的唯一入口：提交任务、骑手接单和拒单、恢复扫描。
//! 内部由排队器actor、派单循环、仲裁和拒单记录组成。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use dispatch_core::{
    ConnectionRegistry, CourierRegistry, DispatchJob, DispatchResult, DispatcherConfig, OrderId,
    OrderStore, PushNotifier, ReadyOrder, RealtimeChannel, RejectionCache,
};
use dispatch_infrastructure::MetricsCollector;

use crate::arbitration::{AcceptOutcome, Arbiter};
use crate::broadcaster::Broadcaster;
use crate::candidate_selector::{strategy_for, CandidateSelector, SelectionStrategy};
use crate::dispatch_loop::DispatchLoop;
use crate::recovery_service::{OrderRecoveryService, RecoveryReport, RecoveryService};
use crate::rejection_tracker::{RejectOutcome, RejectionTracker};
use crate::sequencer::{Sequencer, SequencerHandle, SubmitOutcome};

/// 派单引擎依赖的外部组件
#[derive(Clone)]
pub struct DispatchDependencies {
    pub courier_registry: Arc<dyn CourierRegistry>,
    pub connection_registry: Arc<dyn ConnectionRegistry>,
    pub order_store: Arc<dyn OrderStore>,
    pub rejection_cache: Arc<dyn RejectionCache>,
    pub realtime: Arc<dyn RealtimeChannel>,
    pub push: Arc<dyn PushNotifier>,
    pub metrics: Arc<MetricsCollector>,
}

struct EngineInner {
    sequencer: SequencerHandle,
    sequencer_task: Mutex<Option<JoinHandle<()>>>,
    dispatch_loop: DispatchLoop,
    arbiter: Arbiter,
    rejections: RejectionTracker,
    recovery: Arc<dyn RecoveryService>,
    rejection_cache: Arc<dyn RejectionCache>,
    metrics: Arc<MetricsCollector>,
}

/// 派单引擎句柄，可克隆后在多个任务间共享
#[derive(Clone)]
pub struct DispatchEngine {
    inner: Arc<EngineInner>,
}

impl DispatchEngine {
    /// 使用配置中的排序策略启动引擎
    pub fn start(deps: DispatchDependencies, config: &DispatcherConfig) -> Self {
        Self::start_with_strategy(deps, config, strategy_for(config.selection_strategy))
    }

    pub fn start_with_strategy(
        deps: DispatchDependencies,
        config: &DispatcherConfig,
        strategy: Arc<dyn SelectionStrategy>,
    ) -> Self {
        let (sequencer, sequencer_task) = Sequencer::spawn(
            config.max_attempts,
            config.recovery_window(),
            config.command_buffer,
            deps.metrics.clone(),
        );

        let broadcaster = Broadcaster::new(
            deps.realtime.clone(),
            deps.push.clone(),
            deps.metrics.clone(),
            config.broadcast_fallback,
        );
        let selector = Arc::new(CandidateSelector::new(
            deps.courier_registry.clone(),
            deps.connection_registry.clone(),
            strategy,
            config.max_fan_out,
        ));
        let dispatch_loop = DispatchLoop::new(
            sequencer.clone(),
            selector,
            broadcaster.clone(),
            deps.rejection_cache.clone(),
            deps.metrics.clone(),
            config.offer_timeout(),
            config.inter_job_delay(),
        );
        let arbiter = Arbiter::new(
            sequencer.clone(),
            deps.order_store.clone(),
            deps.courier_registry.clone(),
            deps.rejection_cache.clone(),
            broadcaster,
            deps.metrics.clone(),
        );
        let rejections = RejectionTracker::new(
            sequencer.clone(),
            deps.rejection_cache.clone(),
            deps.metrics.clone(),
            config.rejection_ttl(),
        );
        let recovery = Arc::new(OrderRecoveryService::new(
            deps.order_store.clone(),
            deps.rejection_cache.clone(),
            config.recovery_window(),
        ));

        info!(
            "派单引擎启动: 最大派单轮数 {}, 单轮超时 {}秒, 单轮最多推送 {} 人",
            config.max_attempts, config.offer_timeout_seconds, config.max_fan_out
        );

        Self {
            inner: Arc::new(EngineInner {
                sequencer,
                sequencer_task: Mutex::new(Some(sequencer_task)),
                dispatch_loop,
                arbiter,
                rejections,
                recovery,
                rejection_cache: deps.rejection_cache,
                metrics: deps.metrics,
            }),
        }
    }

    /// 订单可以取货时提交派单任务，同一订单重复提交会被忽略
    pub async fn submit_job(&self, order: ReadyOrder) -> DispatchResult<SubmitOutcome> {
        let rejected = match self.inner.rejection_cache.load(&order.order_id).await {
            Ok(rejected) => rejected,
            Err(e) => {
                warn!("读取订单 {} 的拒单缓存失败: {}", order.order_id, e);
                HashSet::new()
            }
        };
        let job = DispatchJob::new(order).with_rejections(rejected);
        self.submit(job).await
    }

    async fn submit(&self, job: DispatchJob) -> DispatchResult<SubmitOutcome> {
        let order_id = job.order_id.clone();
        let ack = self.inner.sequencer.submit(job).await?;

        match ack.outcome {
            SubmitOutcome::AlreadyTracked => {
                debug!("订单 {} 已在派单中，忽略重复提交", order_id);
            }
            outcome => {
                self.inner.metrics.record_job_submitted();
                debug!("订单 {} 加入派单队列: {:?}", order_id, outcome);
            }
        }

        if ack.start_loop {
            tokio::spawn(self.inner.dispatch_loop.clone().run());
        }
        Ok(ack.outcome)
    }

    /// 骑手接单
    pub async fn courier_accepted(
        &self,
        order_id: &str,
        courier_id: &str,
    ) -> DispatchResult<AcceptOutcome> {
        self.inner.arbiter.accept(order_id, courier_id).await
    }

    /// 骑手拒单
    pub async fn courier_rejected(
        &self,
        order_id: &str,
        courier_id: &str,
    ) -> DispatchResult<RejectOutcome> {
        self.inner.rejections.reject(order_id, courier_id).await
    }

    /// 扫描恢复窗口内仍未分配的订单并重新入队，可重复调用
    pub async fn trigger_recovery_sweep(&self) -> DispatchResult<RecoveryReport> {
        let started = Instant::now();
        let jobs = self.inner.recovery.discover_unassigned_jobs().await?;

        let mut report = RecoveryReport {
            discovered: jobs.len(),
            ..Default::default()
        };
        let unassigned: HashSet<OrderId> = jobs.iter().map(|job| job.order_id.clone()).collect();

        for job in jobs {
            let order_id = job.order_id.clone();
            match self.submit(job).await? {
                SubmitOutcome::AlreadyTracked => report.already_tracked += 1,
                SubmitOutcome::Enqueued | SubmitOutcome::Requeued => report.enqueued.push(order_id),
            }
        }
        report.pruned = self.inner.sequencer.prune_parked(unassigned).await?;
        report.recovery_duration_ms = started.elapsed().as_millis() as u64;

        self.inner
            .metrics
            .record_recovered_jobs(report.enqueued.len() as u64);
        info!(
            "恢复扫描完成: 发现 {} 个, 入队 {} 个, 已在派单 {} 个, 清理 {} 个, 耗时 {}ms",
            report.discovered,
            report.enqueued.len(),
            report.already_tracked,
            report.pruned,
            report.recovery_duration_ms
        );
        Ok(report)
    }

    /// 骑手上线时重新扫描等待中的订单
    pub async fn courier_came_online(&self, courier_id: &str) -> DispatchResult<RecoveryReport> {
        info!("骑手 {} 上线，触发恢复扫描", courier_id);
        self.trigger_recovery_sweep().await
    }

    /// 查询本地跟踪的任务
    pub async fn job_snapshot(&self, order_id: &str) -> DispatchResult<Option<DispatchJob>> {
        self.inner.sequencer.snapshot(order_id).await
    }

    /// 当前排队中的订单，按出队顺序
    pub async fn queued_orders(&self) -> DispatchResult<Vec<OrderId>> {
        self.inner.sequencer.queued_orders().await
    }

    /// 按固定间隔执行恢复扫描，收到关闭信号后退出
    pub fn spawn_periodic_recovery(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次tick立即完成，启动时的扫描由调用方负责
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = engine.trigger_recovery_sweep().await {
                            error!("周期恢复扫描失败: {}", e);
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("周期恢复扫描已停止");
                        break;
                    }
                }
            }
        })
    }

    /// 停止排队器，之后的所有调用返回`EngineStopped`
    pub async fn shutdown(&self) {
        self.inner.sequencer.shutdown().await;
        if let Some(task) = self.inner.sequencer_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("排队器任务异常退出: {}", e);
            }
        }
        info!("派单引擎已停止");
    }
}
