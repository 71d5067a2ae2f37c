use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GeoPoint, OrderId};

/// 订单商品条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
}

/// 派单展示所需的订单信息，派单核心不解释其内容
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderPayload {
    pub vendor_name: String,
    pub customer_name: String,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub pickup_location: Option<GeoPoint>,
    pub delivery_fee: f64,
    pub distance_km: Option<f64>,
    pub items: Vec<OrderItem>,
}

/// 等待取货的订单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyOrder {
    pub order_id: OrderId,
    pub vendor_id: String,
    pub customer_id: String,
    pub payload: OrderPayload,
    pub ready_at: DateTime<Utc>,
}
