use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CourierId, OrderId, OrderPayload, ReadyOrder};

/// 派单任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "ASSIGNED")]
    Assigned,
    #[serde(rename = "WAITING_FOR_COURIERS")]
    WaitingForCouriers,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Active => "ACTIVE",
            JobStatus::Assigned => "ASSIGNED",
            JobStatus::WaitingForCouriers => "WAITING_FOR_COURIERS",
        }
    }

    /// 状态迁移是否合法
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Active)
                | (JobStatus::Active, JobStatus::Assigned)
                | (JobStatus::Active, JobStatus::Queued)
                | (JobStatus::Active, JobStatus::WaitingForCouriers)
                | (JobStatus::WaitingForCouriers, JobStatus::Queued)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个订单的派单任务记录
///
/// 内存中的任务表只是本地缓存，订单归属以订单存储的条件写入为准。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchJob {
    pub order_id: OrderId,
    pub vendor_id: String,
    pub customer_id: String,
    pub payload: OrderPayload,
    pub status: JobStatus,
    pub attempts: u32,
    /// 明确拒单的骑手，只增不减
    pub rejected_couriers: HashSet<CourierId>,
    /// 本轮派单推送到的骑手快照
    pub offered_couriers: Vec<CourierId>,
    pub created_at: DateTime<Utc>,
    pub offer_expires_at: Option<DateTime<Utc>>,
}

impl DispatchJob {
    /// 根据待取货订单创建新的派单任务
    pub fn new(order: ReadyOrder) -> Self {
        Self {
            order_id: order.order_id,
            vendor_id: order.vendor_id,
            customer_id: order.customer_id,
            payload: order.payload,
            status: JobStatus::Queued,
            attempts: 0,
            rejected_couriers: HashSet::new(),
            offered_couriers: Vec::new(),
            created_at: Utc::now(),
            offer_expires_at: None,
        }
    }

    /// 用持久化的拒单记录初始化
    pub fn with_rejections(mut self, rejected: HashSet<CourierId>) -> Self {
        self.rejected_couriers.extend(rejected);
        self
    }

    /// 执行状态迁移，非法迁移返回false且不修改状态
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next != JobStatus::Active {
            self.offered_couriers.clear();
            self.offer_expires_at = None;
        }
        true
    }

    /// 出队，进入派单中状态
    pub fn activate(&mut self) -> bool {
        self.transition(JobStatus::Active)
    }

    /// 在派单中状态下开始新一轮推送
    pub fn begin_attempt(&mut self, offered: Vec<CourierId>, expires_at: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Active || self.offer_expires_at.is_some() {
            return false;
        }
        self.attempts += 1;
        self.offered_couriers = offered
            .into_iter()
            .filter(|courier| !self.rejected_couriers.contains(courier))
            .collect();
        self.offer_expires_at = Some(expires_at);
        true
    }

    pub fn was_offered(&self, courier_id: &str) -> bool {
        self.offered_couriers.iter().any(|c| c == courier_id)
    }

    pub fn has_rejected(&self, courier_id: &str) -> bool {
        self.rejected_couriers.contains(courier_id)
    }

    /// 记录拒单，返回是否为新增记录
    pub fn record_rejection(&mut self, courier_id: &str) -> bool {
        self.rejected_couriers.insert(courier_id.to_string())
    }

    /// 本轮仍可接单的骑手
    pub fn pending_couriers(&self) -> Vec<&CourierId> {
        self.offered_couriers
            .iter()
            .filter(|courier| !self.rejected_couriers.contains(*courier))
            .collect()
    }

    /// 本轮推送到的骑手是否已全部拒单
    pub fn all_offered_rejected(&self) -> bool {
        self.status == JobStatus::Active
            && !self.offered_couriers.is_empty()
            && self.pending_couriers().is_empty()
    }

    /// 除指定骑手外本轮收到推送的骑手
    pub fn other_offered(&self, courier_id: &str) -> Vec<CourierId> {
        self.offered_couriers
            .iter()
            .filter(|c| c.as_str() != courier_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> DispatchJob {
        DispatchJob::new(ReadyOrder {
            order_id: "order-1".to_string(),
            vendor_id: "vendor-1".to_string(),
            customer_id: "customer-1".to_string(),
            payload: OrderPayload::default(),
            ready_at: Utc::now(),
        })
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.offered_couriers.is_empty());
        assert!(job.offer_expires_at.is_none());
    }

    #[test]
    fn test_transition_table() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Active));
        assert!(Active.can_transition_to(Assigned));
        assert!(Active.can_transition_to(Queued));
        assert!(Active.can_transition_to(WaitingForCouriers));
        assert!(WaitingForCouriers.can_transition_to(Queued));

        assert!(!Queued.can_transition_to(Assigned));
        assert!(!Assigned.can_transition_to(Queued));
        assert!(!WaitingForCouriers.can_transition_to(Active));
        assert!(!Queued.can_transition_to(WaitingForCouriers));
    }

    #[test]
    fn test_begin_attempt_skips_rejected_couriers() {
        let mut job = job().with_rejections(HashSet::from(["b".to_string()]));
        let expires = Utc::now() + Duration::seconds(60);

        // 未出队的任务不能开始推送
        assert!(!job.begin_attempt(vec!["a".into()], expires));

        assert!(job.activate());
        assert!(job.begin_attempt(vec!["a".into(), "b".into(), "c".into()], expires));
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.offered_couriers, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(job.offer_expires_at, Some(expires));

        // 同一轮不能重复开始
        assert!(!job.begin_attempt(vec!["a".into()], expires));
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn test_all_offered_rejected() {
        let mut job = job();
        job.activate();
        job.begin_attempt(vec!["a".into(), "b".into()], Utc::now());
        assert!(!job.all_offered_rejected());

        assert!(job.record_rejection("a"));
        assert!(!job.record_rejection("a"));
        assert!(!job.all_offered_rejected());
        assert_eq!(job.pending_couriers(), vec![&"b".to_string()]);

        job.record_rejection("b");
        assert!(job.all_offered_rejected());
    }

    #[test]
    fn test_requeue_clears_offer_snapshot() {
        let mut job = job();
        job.activate();
        job.begin_attempt(vec!["a".into()], Utc::now());
        job.record_rejection("a");

        assert!(job.transition(JobStatus::Queued));
        assert!(job.offered_couriers.is_empty());
        assert!(job.offer_expires_at.is_none());
        assert!(job.has_rejected("a"));
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn test_other_offered() {
        let mut job = job();
        job.activate();
        job.begin_attempt(vec!["a".into(), "b".into(), "c".into()], Utc::now());
        assert_eq!(job.other_offered("b"), vec!["a".to_string(), "c".to_string()]);
    }
}
