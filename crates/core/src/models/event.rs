use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CourierId, DispatchJob, OrderId, OrderPayload};

/// 派单撤回原因
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    AcceptedByAnother,
    AlreadyAssigned,
}

/// 推送给骑手的派单内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOffer {
    pub offer_id: Uuid,
    pub order_id: OrderId,
    pub vendor_id: String,
    pub customer_id: String,
    pub payload: OrderPayload,
    pub attempt: u32,
    pub expires_at: DateTime<Utc>,
}

impl JobOffer {
    /// 根据处于派单中的任务构造推送内容
    pub fn for_job(job: &DispatchJob) -> Option<Self> {
        let expires_at = job.offer_expires_at?;
        Some(Self {
            offer_id: Uuid::new_v4(),
            order_id: job.order_id.clone(),
            vendor_id: job.vendor_id.clone(),
            customer_id: job.customer_id.clone(),
            payload: job.payload.clone(),
            attempt: job.attempts,
            expires_at,
        })
    }
}

/// 对外发布的派单事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    Offer {
        order_id: OrderId,
        offer: JobOffer,
    },
    OfferBroadcast {
        order_id: OrderId,
        offer: JobOffer,
    },
    JobRemoved {
        order_id: OrderId,
        reason: RemovalReason,
    },
    NoCouriersAvailable {
        order_id: OrderId,
    },
    WaitingForCouriers {
        order_id: OrderId,
        attempts: u32,
    },
    JobAssigned {
        order_id: OrderId,
        courier_id: CourierId,
    },
}

impl DispatchEvent {
    pub fn order_id(&self) -> &str {
        match self {
            DispatchEvent::Offer { order_id, .. }
            | DispatchEvent::OfferBroadcast { order_id, .. }
            | DispatchEvent::JobRemoved { order_id, .. }
            | DispatchEvent::NoCouriersAvailable { order_id }
            | DispatchEvent::WaitingForCouriers { order_id, .. }
            | DispatchEvent::JobAssigned { order_id, .. } => order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DispatchEvent::Offer { .. } => "offer",
            DispatchEvent::OfferBroadcast { .. } => "offer_broadcast",
            DispatchEvent::JobRemoved { .. } => "job_removed",
            DispatchEvent::NoCouriersAvailable { .. } => "no_couriers_available",
            DispatchEvent::WaitingForCouriers { .. } => "waiting_for_couriers",
            DispatchEvent::JobAssigned { .. } => "job_assigned",
        }
    }
}
