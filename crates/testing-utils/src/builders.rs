//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, Utc};
use dispatch_core::{CourierInfo, GeoPoint, OrderItem, OrderPayload, ReadyOrder};

/// Builder for creating test ReadyOrder entities
pub struct ReadyOrderBuilder {
    order: ReadyOrder,
}

impl ReadyOrderBuilder {
    pub fn new() -> Self {
        Self {
            order: ReadyOrder {
                order_id: "order-1".to_string(),
                vendor_id: "vendor-1".to_string(),
                customer_id: "customer-1".to_string(),
                payload: OrderPayload {
                    vendor_name: "Test Kitchen".to_string(),
                    customer_name: "Test Customer".to_string(),
                    pickup_address: "1 Pickup Street".to_string(),
                    dropoff_address: "2 Dropoff Avenue".to_string(),
                    pickup_location: Some(GeoPoint::new(6.5244, 3.3792)),
                    delivery_fee: 1500.0,
                    distance_km: Some(3.2),
                    items: vec![OrderItem {
                        name: "Jollof Rice".to_string(),
                        quantity: 2,
                    }],
                },
                ready_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, order_id: &str) -> Self {
        self.order.order_id = order_id.to_string();
        self
    }

    pub fn with_vendor(mut self, vendor_id: &str) -> Self {
        self.order.vendor_id = vendor_id.to_string();
        self
    }

    pub fn with_customer(mut self, customer_id: &str) -> Self {
        self.order.customer_id = customer_id.to_string();
        self
    }

    pub fn with_pickup_location(mut self, location: Option<GeoPoint>) -> Self {
        self.order.payload.pickup_location = location;
        self
    }

    pub fn with_ready_at(mut self, ready_at: DateTime<Utc>) -> Self {
        self.order.ready_at = ready_at;
        self
    }

    pub fn build(self) -> ReadyOrder {
        self.order
    }
}

impl Default for ReadyOrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test CourierInfo entities
///
/// Defaults to an online courier with a known location and no active order.
pub struct CourierInfoBuilder {
    courier: CourierInfo,
}

impl CourierInfoBuilder {
    pub fn new() -> Self {
        Self {
            courier: CourierInfo {
                id: "courier-1".to_string(),
                name: "Test Courier".to_string(),
                is_online: true,
                location: Some(GeoPoint::new(6.5250, 3.3800)),
                active_order_id: None,
                last_seen_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, courier_id: &str) -> Self {
        self.courier.id = courier_id.to_string();
        self.courier.name = format!("Courier {}", courier_id);
        self
    }

    pub fn with_location(mut self, location: Option<GeoPoint>) -> Self {
        self.courier.location = location;
        self
    }

    pub fn offline(mut self) -> Self {
        self.courier.is_online = false;
        self
    }

    pub fn with_active_order(mut self, order_id: &str) -> Self {
        self.courier.active_order_id = Some(order_id.to_string());
        self
    }

    pub fn build(self) -> CourierInfo {
        self.courier
    }
}

impl Default for CourierInfoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build available couriers with the given ids
pub fn available_couriers(ids: &[&str]) -> Vec<CourierInfo> {
    ids.iter()
        .map(|id| CourierInfoBuilder::new().with_id(id).build())
        .collect()
}
