use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 单轮派单超时的上限
const MAX_OFFER_TIMEOUT_SECONDS: u64 = 86_400;

/// 候选骑手排序策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategyKind {
    /// 保持注册表返回的顺序
    Stable,
    /// 距离取货点最近优先，位置未知的排在最后
    Nearest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub max_attempts: u32,
    pub offer_timeout_seconds: u64,
    pub inter_job_delay_seconds: u64,
    pub max_fan_out: usize,
    pub rejection_ttl_seconds: u64,
    pub recovery_window_hours: i64,
    /// 周期性恢复扫描间隔，0表示只在触发时扫描
    pub recovery_interval_seconds: u64,
    pub selection_strategy: SelectionStrategyKind,
    /// 额外向所有骑手广播一条轻量派单消息
    pub broadcast_fallback: bool,
    pub command_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            offer_timeout_seconds: 60,
            inter_job_delay_seconds: 5,
            max_fan_out: 5,
            rejection_ttl_seconds: 3600,
            recovery_window_hours: 24,
            recovery_interval_seconds: 300,
            selection_strategy: SelectionStrategyKind::Stable,
            broadcast_fallback: false,
            command_buffer: 256,
        }
    }
}

impl DispatcherConfig {
    pub fn offer_timeout(&self) -> Duration {
        Duration::from_secs(self.offer_timeout_seconds)
    }

    pub fn inter_job_delay(&self) -> Duration {
        Duration::from_secs(self.inter_job_delay_seconds)
    }

    pub fn rejection_ttl(&self) -> Duration {
        Duration::from_secs(self.rejection_ttl_seconds)
    }

    pub fn recovery_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recovery_window_hours)
    }

    pub fn recovery_interval(&self) -> Option<Duration> {
        (self.recovery_interval_seconds > 0)
            .then(|| Duration::from_secs(self.recovery_interval_seconds))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("最大派单次数必须大于0"));
        }

        if self.offer_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("派单超时时间必须大于0"));
        }

        if self.offer_timeout_seconds > MAX_OFFER_TIMEOUT_SECONDS {
            return Err(anyhow::anyhow!(
                "派单超时时间不能超过{}秒",
                MAX_OFFER_TIMEOUT_SECONDS
            ));
        }

        if self.max_fan_out == 0 {
            return Err(anyhow::anyhow!("单轮最大推送人数必须大于0"));
        }

        // 拒单记录必须覆盖任务可能的最长生命周期
        let max_job_lifetime = self
            .offer_timeout_seconds
            .saturating_mul(u64::from(self.max_attempts));
        if self.rejection_ttl_seconds < max_job_lifetime {
            return Err(anyhow::anyhow!(
                "拒单缓存过期时间({}秒)不能小于任务最长生命周期({}秒)",
                self.rejection_ttl_seconds,
                max_job_lifetime
            ));
        }

        if self.recovery_window_hours <= 0 {
            return Err(anyhow::anyhow!("恢复扫描时间窗口必须大于0"));
        }

        if self.command_buffer == 0 {
            return Err(anyhow::anyhow!("命令缓冲区大小必须大于0"));
        }

        Ok(())
    }
}
