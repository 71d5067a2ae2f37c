use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CourierId, OrderId};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// 地理坐标
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// 两点之间的大圆距离（公里）
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// 骑手信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierInfo {
    pub id: CourierId,
    pub name: String,
    pub is_online: bool,
    pub location: Option<GeoPoint>,
    /// 当前正在配送的订单（已接单/已取货/配送中）
    pub active_order_id: Option<OrderId>,
    pub last_seen_at: DateTime<Utc>,
}

impl CourierInfo {
    /// 检查骑手是否可以接收新的派单
    pub fn is_available(&self) -> bool {
        self.is_online && self.location.is_some() && self.active_order_id.is_none()
    }

    /// 到指定位置的距离，位置未知时返回None
    pub fn distance_to(&self, point: &GeoPoint) -> Option<f64> {
        self.location.map(|location| location.distance_km(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn courier(online: bool, location: Option<GeoPoint>, active: Option<&str>) -> CourierInfo {
        CourierInfo {
            id: "c-1".to_string(),
            name: "Test".to_string(),
            is_online: online,
            location,
            active_order_id: active.map(str::to_string),
            last_seen_at: Utc::now(),
        }
    }

    #[test]
    fn test_courier_availability() {
        let here = Some(GeoPoint::new(6.5244, 3.3792));
        assert!(courier(true, here, None).is_available());
        assert!(!courier(false, here, None).is_available());
        assert!(!courier(true, None, None).is_available());
        assert!(!courier(true, here, Some("order-1")).is_available());
    }

    #[test]
    fn test_distance_km() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        let d = a.distance_km(&b);
        assert!((d - 111.19).abs() < 0.1, "distance was {d}");
        assert_eq!(a.distance_km(&a), 0.0);
    }
}
