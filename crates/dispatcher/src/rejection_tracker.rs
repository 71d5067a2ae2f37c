use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use dispatch_core::{DispatchResult, RejectionCache};
use dispatch_infrastructure::MetricsCollector;

use crate::sequencer::{RejectionRecord, SequencerHandle};

/// 拒单请求的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectOutcome {
    /// 已记录，`attempt_ended`表示本轮因全员拒单而提前结束
    Recorded { attempt_ended: bool },
    /// 重复拒单
    Duplicate,
}

/// 拒单记录
///
/// 先写内存任务表再写拒单缓存，缓存写入是幂等的。缓存写入失败时返回错误，
/// 但内存中的记录保留，本实例内不会再向该骑手推送。
pub struct RejectionTracker {
    sequencer: SequencerHandle,
    rejection_cache: Arc<dyn RejectionCache>,
    metrics: Arc<MetricsCollector>,
    ttl: Duration,
}

impl RejectionTracker {
    pub fn new(
        sequencer: SequencerHandle,
        rejection_cache: Arc<dyn RejectionCache>,
        metrics: Arc<MetricsCollector>,
        ttl: Duration,
    ) -> Self {
        Self {
            sequencer,
            rejection_cache,
            metrics,
            ttl,
        }
    }

    pub async fn reject(&self, order_id: &str, courier_id: &str) -> DispatchResult<RejectOutcome> {
        let outcome = match self.sequencer.record_rejection(order_id, courier_id).await? {
            RejectionRecord::Duplicate => {
                debug!("骑手 {} 重复拒绝订单 {}", courier_id, order_id);
                RejectOutcome::Duplicate
            }
            RejectionRecord::Untracked => {
                debug!("订单 {} 未在本地跟踪，仅写入拒单缓存", order_id);
                RejectOutcome::Recorded {
                    attempt_ended: false,
                }
            }
            RejectionRecord::Recorded { attempt_ended } => {
                if attempt_ended {
                    info!("订单 {} 本轮推送的骑手已全部拒单", order_id);
                }
                RejectOutcome::Recorded { attempt_ended }
            }
        };

        if outcome != RejectOutcome::Duplicate {
            self.metrics.record_rejection();
        }
        // 重复拒单也写入缓存，上次写入失败时由重试补齐
        self.rejection_cache
            .add(order_id, courier_id, self.ttl)
            .await?;

        Ok(outcome)
    }
}
