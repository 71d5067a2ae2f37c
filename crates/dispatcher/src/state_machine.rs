//! 派单轮次的结束判定
//!
//! 这里只包含纯函数，排队器和派单循环都通过它决定任务的下一步去向。

use serde::Serialize;

/// 单轮派单结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptEnd {
    /// 有骑手抢单成功
    Assigned,
    /// 本轮推送到的骑手全部拒单
    AllRejected,
    /// 超时无人接单
    Expired,
}

/// 本轮结束后任务的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptDecision {
    /// 任务已不在本地跟踪（已分配或已移除）
    Resolved,
    /// 放回队首立即重试
    RetryFront,
    /// 尝试次数用尽，转入等待骑手状态
    Park,
}

/// 根据结束原因和已尝试次数决定去向
///
/// 全员拒单和超时走同一条路径，区别只在于前者不必等到截止时间。
pub fn decide_after_attempt(end: AttemptEnd, attempts: u32, max_attempts: u32) -> AttemptDecision {
    match end {
        AttemptEnd::Assigned => AttemptDecision::Resolved,
        AttemptEnd::AllRejected | AttemptEnd::Expired => {
            if attempts < max_attempts {
                AttemptDecision::RetryFront
            } else {
                AttemptDecision::Park
            }
        }
    }
}

/// 单轮派单在派单循环中的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Assigned,
    Retried,
    /// 转入等待骑手，`offered`表示本轮是否真正推送过
    Parked { offered: bool },
    /// 任务在本轮开始前已被移出本地跟踪
    Skipped,
}

impl AttemptOutcome {
    /// 处理下一个任务之前是否需要冷却
    ///
    /// 只有推送过且最终搁置的任务才冷却：分配成功、队首重试、
    /// 无候选骑手的立即搁置都直接处理下一个任务。
    pub fn requires_cooldown(&self) -> bool {
        matches!(self, AttemptOutcome::Parked { offered: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_until_max_attempts() {
        assert_eq!(
            decide_after_attempt(AttemptEnd::Expired, 1, 3),
            AttemptDecision::RetryFront
        );
        assert_eq!(
            decide_after_attempt(AttemptEnd::Expired, 2, 3),
            AttemptDecision::RetryFront
        );
        assert_eq!(
            decide_after_attempt(AttemptEnd::Expired, 3, 3),
            AttemptDecision::Park
        );
    }

    #[test]
    fn test_all_rejected_follows_expiry_path() {
        assert_eq!(
            decide_after_attempt(AttemptEnd::AllRejected, 1, 3),
            AttemptDecision::RetryFront
        );
        assert_eq!(
            decide_after_attempt(AttemptEnd::AllRejected, 3, 3),
            AttemptDecision::Park
        );
    }

    #[test]
    fn test_assigned_is_resolved() {
        assert_eq!(
            decide_after_attempt(AttemptEnd::Assigned, 1, 3),
            AttemptDecision::Resolved
        );
    }

    #[test]
    fn test_cooldown_only_after_offered_park() {
        assert!(AttemptOutcome::Parked { offered: true }.requires_cooldown());
        assert!(!AttemptOutcome::Parked { offered: false }.requires_cooldown());
        assert!(!AttemptOutcome::Assigned.requires_cooldown());
        assert!(!AttemptOutcome::Retried.requires_cooldown());
        assert!(!AttemptOutcome::Skipped.requires_cooldown());
    }
}
