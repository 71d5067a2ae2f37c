//! 派单排队器
//!
//! 单个tokio任务独占任务表和FIFO队列，所有修改都通过命令通道串行执行。
//! 排队器自身从不等待I/O，耗时操作由派单循环完成后再把状态迁移报告回来。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use dispatch_core::{CourierId, DispatchError, DispatchJob, DispatchResult, JobStatus, OrderId};
use dispatch_infrastructure::MetricsCollector;

use crate::state_machine::{decide_after_attempt, AttemptDecision, AttemptEnd};

/// 提交任务的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// 新任务进入队尾
    Enqueued,
    /// 等待骑手的任务重新入队，尝试次数清零
    Requeued,
    /// 任务已在排队或派单中，忽略本次提交
    AlreadyTracked,
}

/// 接单请求在本地任务表中的校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptCheck {
    Eligible,
    NotOffered,
    AlreadyRejected,
    Expired,
    /// 本地未跟踪该订单，由订单存储裁决
    Untracked,
}

/// 拒单在本地任务表中的记录结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionRecord {
    Untracked,
    Duplicate,
    Recorded { attempt_ended: bool },
}

/// 一轮结束后排队器的处理结果
#[derive(Debug, Clone)]
pub enum FinishedAttempt {
    Resolved,
    Retried { attempts: u32 },
    Parked(DispatchJob),
}

/// 分配成功后从任务表移除的任务
#[derive(Debug, Clone)]
pub struct AssignedJob {
    pub job: DispatchJob,
    /// 本轮收到推送但未抢到的骑手
    pub losers: Vec<CourierId>,
}

/// 开始新一轮推送所需的参数
#[derive(Debug)]
pub struct AttemptStart {
    pub order_id: OrderId,
    pub offered: Vec<CourierId>,
    pub expires_at: DateTime<Utc>,
    pub deadline: Instant,
    /// 从拒单缓存读到的记录，合并进任务
    pub known_rejections: HashSet<CourierId>,
    pub signal: oneshot::Sender<AttemptEnd>,
}

#[derive(Debug)]
pub(crate) struct SubmitAck {
    pub outcome: SubmitOutcome,
    /// 派单循环当前空闲，需要由调用方启动
    pub start_loop: bool,
}

struct ActiveAttempt {
    order_id: OrderId,
    deadline: Instant,
    signal: Option<oneshot::Sender<AttemptEnd>>,
}

/// 排队器持有的全部内存状态
pub(crate) struct SequencerState {
    jobs: HashMap<OrderId, DispatchJob>,
    queue: VecDeque<OrderId>,
    active: Option<ActiveAttempt>,
    loop_running: bool,
    max_attempts: u32,
    /// 等待骑手的任务超过该时长后不会再被恢复扫描发现
    parked_retention: chrono::Duration,
}

impl SequencerState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            jobs: HashMap::new(),
            queue: VecDeque::new(),
            active: None,
            loop_running: false,
            max_attempts,
            parked_retention: chrono::Duration::hours(24),
        }
    }

    pub fn with_parked_retention(mut self, retention: chrono::Duration) -> Self {
        self.parked_retention = retention;
        self
    }

    pub fn submit(&mut self, mut job: DispatchJob) -> SubmitAck {
        let outcome = match self.jobs.get_mut(&job.order_id) {
            Some(existing) if existing.status == JobStatus::WaitingForCouriers => {
                existing.transition(JobStatus::Queued);
                existing.attempts = 0;
                existing
                    .rejected_couriers
                    .extend(job.rejected_couriers.drain());
                self.queue.push_back(existing.order_id.clone());
                SubmitOutcome::Requeued
            }
            Some(_) => SubmitOutcome::AlreadyTracked,
            None => {
                if job.status == JobStatus::WaitingForCouriers {
                    job.transition(JobStatus::Queued);
                }
                job.attempts = 0;
                self.queue.push_back(job.order_id.clone());
                self.jobs.insert(job.order_id.clone(), job);
                SubmitOutcome::Enqueued
            }
        };

        let start_loop = outcome != SubmitOutcome::AlreadyTracked && !self.loop_running;
        if start_loop {
            self.loop_running = true;
        }
        SubmitAck {
            outcome,
            start_loop,
        }
    }

    /// 取出队首任务并进入派单中状态，队列为空时标记派单循环空闲
    pub fn next_job(&mut self) -> Option<DispatchJob> {
        while let Some(order_id) = self.queue.pop_front() {
            if let Some(job) = self.jobs.get_mut(&order_id) {
                if job.activate() {
                    return Some(job.clone());
                }
                warn!("订单 {} 状态为 {}，无法出队", order_id, job.status);
            }
        }
        self.loop_running = false;
        None
    }

    pub fn begin_attempt(&mut self, start: AttemptStart) -> Option<DispatchJob> {
        let job = self.jobs.get_mut(&start.order_id)?;
        job.rejected_couriers.extend(start.known_rejections);
        if !job.begin_attempt(start.offered, start.expires_at) {
            return None;
        }
        self.active = Some(ActiveAttempt {
            order_id: start.order_id,
            deadline: start.deadline,
            signal: Some(start.signal),
        });
        Some(job.clone())
    }

    /// 转入等待骑手状态，任务保留在任务表中但不再排队
    ///
    /// 保留的任务让迟到的接单得到`OfferExpired`，也让重新提交走`Requeued`。
    /// 已在别处分配或取消的订单由恢复扫描清理；超出保留时长的任务在这里顺带清理，
    /// 关闭周期扫描时任务表也不会无限增长。
    pub fn park(&mut self, order_id: &str) -> Option<DispatchJob> {
        self.clear_active(order_id);
        self.queue.retain(|id| id != order_id);
        let job = self.jobs.get_mut(order_id)?;
        if !job.transition(JobStatus::WaitingForCouriers) {
            warn!("订单 {} 状态为 {}，无法转入等待骑手", order_id, job.status);
            return None;
        }
        let parked = job.clone();

        let evicted = self.evict_stale_parked(order_id, Utc::now());
        if evicted > 0 {
            debug!("清理 {} 个超出保留时长的等待任务", evicted);
        }
        Some(parked)
    }

    fn evict_stale_parked(&mut self, current: &str, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.parked_retention;
        let before = self.jobs.len();
        self.jobs.retain(|order_id, job| {
            order_id == current
                || job.status != JobStatus::WaitingForCouriers
                || job.created_at >= cutoff
        });
        before - self.jobs.len()
    }

    pub fn finish_attempt(&mut self, order_id: &str, end: AttemptEnd) -> FinishedAttempt {
        self.clear_active(order_id);
        let max_attempts = self.max_attempts;
        let Some(job) = self.jobs.get_mut(order_id) else {
            return FinishedAttempt::Resolved;
        };
        if job.status != JobStatus::Active {
            return FinishedAttempt::Resolved;
        }

        match decide_after_attempt(end, job.attempts, max_attempts) {
            AttemptDecision::Resolved => FinishedAttempt::Resolved,
            AttemptDecision::RetryFront => {
                job.transition(JobStatus::Queued);
                let attempts = job.attempts;
                self.queue.push_front(order_id.to_string());
                FinishedAttempt::Retried { attempts }
            }
            AttemptDecision::Park => match self.park(order_id) {
                Some(job) => FinishedAttempt::Parked(job),
                None => FinishedAttempt::Resolved,
            },
        }
    }

    pub fn check_accept(&self, order_id: &str, courier_id: &str, now: Instant) -> AcceptCheck {
        let Some(job) = self.jobs.get(order_id) else {
            return AcceptCheck::Untracked;
        };
        if job.has_rejected(courier_id) {
            return AcceptCheck::AlreadyRejected;
        }
        if job.status != JobStatus::Active || job.offer_expires_at.is_none() {
            return AcceptCheck::Expired;
        }
        if !job.was_offered(courier_id) {
            return AcceptCheck::NotOffered;
        }
        match &self.active {
            Some(active) if active.order_id == order_id && now < active.deadline => {
                AcceptCheck::Eligible
            }
            _ => AcceptCheck::Expired,
        }
    }

    /// 订单存储确认分配后移除任务，并唤醒等待中的派单循环
    pub fn confirm_assigned(&mut self, order_id: &str, courier_id: &str) -> Option<AssignedJob> {
        let mut job = self.jobs.remove(order_id)?;
        self.queue.retain(|id| id != order_id);

        let losers = job.other_offered(courier_id);
        if !job.transition(JobStatus::Assigned) {
            debug!("订单 {} 在 {} 状态下被其他途径分配", order_id, job.status);
        }
        self.end_active(order_id, AttemptEnd::Assigned);

        Some(AssignedJob { job, losers })
    }

    pub fn record_rejection(&mut self, order_id: &str, courier_id: &str) -> RejectionRecord {
        let Some(job) = self.jobs.get_mut(order_id) else {
            return RejectionRecord::Untracked;
        };
        if !job.record_rejection(courier_id) {
            return RejectionRecord::Duplicate;
        }
        let attempt_ended =
            job.all_offered_rejected() && self.end_active(order_id, AttemptEnd::AllRejected);
        RejectionRecord::Recorded { attempt_ended }
    }

    /// 清理不在保留集合中的等待骑手任务，返回清理数量
    pub fn prune_parked(&mut self, keep: &HashSet<OrderId>) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|order_id, job| {
            job.status != JobStatus::WaitingForCouriers || keep.contains(order_id)
        });
        before - self.jobs.len()
    }

    pub fn snapshot(&self, order_id: &str) -> Option<DispatchJob> {
        self.jobs.get(order_id).cloned()
    }

    pub fn queued_orders(&self) -> Vec<OrderId> {
        self.queue.iter().cloned().collect()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// 触发本轮结束信号，返回信号是否由本次调用发出
    fn end_active(&mut self, order_id: &str, end: AttemptEnd) -> bool {
        match self.active.as_mut() {
            Some(active) if active.order_id == order_id => match active.signal.take() {
                Some(signal) => signal.send(end).is_ok(),
                None => false,
            },
            _ => false,
        }
    }

    fn clear_active(&mut self, order_id: &str) {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.order_id == order_id)
        {
            self.active = None;
        }
    }
}

enum Command {
    Submit {
        job: DispatchJob,
        reply: oneshot::Sender<SubmitAck>,
    },
    NextJob {
        reply: oneshot::Sender<Option<DispatchJob>>,
    },
    BeginAttempt {
        start: AttemptStart,
        reply: oneshot::Sender<Option<DispatchJob>>,
    },
    Park {
        order_id: OrderId,
        reply: oneshot::Sender<Option<DispatchJob>>,
    },
    FinishAttempt {
        order_id: OrderId,
        end: AttemptEnd,
        reply: oneshot::Sender<FinishedAttempt>,
    },
    CheckAccept {
        order_id: OrderId,
        courier_id: CourierId,
        reply: oneshot::Sender<AcceptCheck>,
    },
    ConfirmAssigned {
        order_id: OrderId,
        courier_id: CourierId,
        reply: oneshot::Sender<Option<AssignedJob>>,
    },
    RecordRejection {
        order_id: OrderId,
        courier_id: CourierId,
        reply: oneshot::Sender<RejectionRecord>,
    },
    PruneParked {
        keep: HashSet<OrderId>,
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        order_id: OrderId,
        reply: oneshot::Sender<Option<DispatchJob>>,
    },
    QueuedOrders {
        reply: oneshot::Sender<Vec<OrderId>>,
    },
    Shutdown,
}

/// 排队器actor
pub struct Sequencer {
    state: SequencerState,
    receiver: mpsc::Receiver<Command>,
    metrics: Arc<MetricsCollector>,
}

impl Sequencer {
    /// 启动排队器任务，返回命令句柄
    pub fn spawn(
        max_attempts: u32,
        parked_retention: chrono::Duration,
        buffer: usize,
        metrics: Arc<MetricsCollector>,
    ) -> (SequencerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let sequencer = Self {
            state: SequencerState::new(max_attempts).with_parked_retention(parked_retention),
            receiver,
            metrics,
        };
        let handle = tokio::spawn(sequencer.run());
        (SequencerHandle { sender }, handle)
    }

    async fn run(mut self) {
        info!("派单排队器启动");
        while let Some(command) = self.receiver.recv().await {
            if !self.handle(command) {
                break;
            }
            self.metrics.update_queue_depth(self.state.queue_depth());
        }
        info!("派单排队器已停止");
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Submit { job, reply } => {
                let _ = reply.send(self.state.submit(job));
            }
            Command::NextJob { reply } => {
                let _ = reply.send(self.state.next_job());
            }
            Command::BeginAttempt { start, reply } => {
                let _ = reply.send(self.state.begin_attempt(start));
            }
            Command::Park { order_id, reply } => {
                let _ = reply.send(self.state.park(&order_id));
            }
            Command::FinishAttempt {
                order_id,
                end,
                reply,
            } => {
                let _ = reply.send(self.state.finish_attempt(&order_id, end));
            }
            Command::CheckAccept {
                order_id,
                courier_id,
                reply,
            } => {
                let check = self.state.check_accept(&order_id, &courier_id, Instant::now());
                let _ = reply.send(check);
            }
            Command::ConfirmAssigned {
                order_id,
                courier_id,
                reply,
            } => {
                let _ = reply.send(self.state.confirm_assigned(&order_id, &courier_id));
            }
            Command::RecordRejection {
                order_id,
                courier_id,
                reply,
            } => {
                let _ = reply.send(self.state.record_rejection(&order_id, &courier_id));
            }
            Command::PruneParked { keep, reply } => {
                let _ = reply.send(self.state.prune_parked(&keep));
            }
            Command::Snapshot { order_id, reply } => {
                let _ = reply.send(self.state.snapshot(&order_id));
            }
            Command::QueuedOrders { reply } => {
                let _ = reply.send(self.state.queued_orders());
            }
            Command::Shutdown => return false,
        }
        true
    }
}

/// 排队器命令句柄，可廉价克隆
#[derive(Clone)]
pub struct SequencerHandle {
    sender: mpsc::Sender<Command>,
}

impl SequencerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> DispatchResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| DispatchError::EngineStopped)?;
        response.await.map_err(|_| DispatchError::EngineStopped)
    }

    pub(crate) async fn submit(&self, job: DispatchJob) -> DispatchResult<SubmitAck> {
        self.request(|reply| Command::Submit { job, reply }).await
    }

    pub async fn next_job(&self) -> DispatchResult<Option<DispatchJob>> {
        self.request(|reply| Command::NextJob { reply }).await
    }

    pub async fn begin_attempt(&self, start: AttemptStart) -> DispatchResult<Option<DispatchJob>> {
        self.request(|reply| Command::BeginAttempt { start, reply })
            .await
    }

    pub async fn park(&self, order_id: &str) -> DispatchResult<Option<DispatchJob>> {
        let order_id = order_id.to_string();
        self.request(|reply| Command::Park { order_id, reply }).await
    }

    pub async fn finish_attempt(
        &self,
        order_id: &str,
        end: AttemptEnd,
    ) -> DispatchResult<FinishedAttempt> {
        let order_id = order_id.to_string();
        self.request(|reply| Command::FinishAttempt {
            order_id,
            end,
            reply,
        })
        .await
    }

    pub async fn check_accept(&self, order_id: &str, courier_id: &str) -> DispatchResult<AcceptCheck> {
        let (order_id, courier_id) = (order_id.to_string(), courier_id.to_string());
        self.request(|reply| Command::CheckAccept {
            order_id,
            courier_id,
            reply,
        })
        .await
    }

    pub async fn confirm_assigned(
        &self,
        order_id: &str,
        courier_id: &str,
    ) -> DispatchResult<Option<AssignedJob>> {
        let (order_id, courier_id) = (order_id.to_string(), courier_id.to_string());
        self.request(|reply| Command::ConfirmAssigned {
            order_id,
            courier_id,
            reply,
        })
        .await
    }

    pub async fn record_rejection(
        &self,
        order_id: &str,
        courier_id: &str,
    ) -> DispatchResult<RejectionRecord> {
        let (order_id, courier_id) = (order_id.to_string(), courier_id.to_string());
        self.request(|reply| Command::RecordRejection {
            order_id,
            courier_id,
            reply,
        })
        .await
    }

    pub async fn prune_parked(&self, keep: HashSet<OrderId>) -> DispatchResult<usize> {
        self.request(|reply| Command::PruneParked { keep, reply })
            .await
    }

    pub async fn snapshot(&self, order_id: &str) -> DispatchResult<Option<DispatchJob>> {
        let order_id = order_id.to_string();
        self.request(|reply| Command::Snapshot { order_id, reply })
            .await
    }

    pub async fn queued_orders(&self) -> DispatchResult<Vec<OrderId>> {
        self.request(|reply| Command::QueuedOrders { reply }).await
    }

    pub async fn shutdown(&self) {
        if self.sender.send(Command::Shutdown).await.is_err() {
            debug!("排队器已经停止");
        }
    }
}
