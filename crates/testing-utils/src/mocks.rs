//! Mock implementations for all collaborator traits
//!
//! This module provides in-memory mock implementations that can be used
//! for unit testing without requiring a database, Redis, or a realtime gateway.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::{
    ConnectionRegistry, CourierId, CourierInfo, CourierRegistry, DispatchError, DispatchEvent,
    DispatchResult, JobOffer, OrderId, OrderStore, PushNotifier, ReadyOrder, RealtimeChannel,
    RejectionCache,
};
use dispatch_infrastructure::{RealtimeEnvelope, RealtimeTarget};

/// Mock implementation of CourierRegistry for testing
#[derive(Debug, Clone)]
pub struct MockCourierRegistry {
    couriers: Arc<Mutex<Vec<CourierInfo>>>,
    fail_queries: Arc<AtomicBool>,
}

impl MockCourierRegistry {
    pub fn new() -> Self {
        Self {
            couriers: Arc::new(Mutex::new(Vec::new())),
            fail_queries: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_couriers(couriers: Vec<CourierInfo>) -> Self {
        let registry = Self::new();
        *registry.couriers.lock().unwrap() = couriers;
        registry
    }

    pub fn add_courier(&self, courier: CourierInfo) {
        self.couriers.lock().unwrap().push(courier);
    }

    /// Make subsequent availability queries fail
    pub fn set_failing(&self, failing: bool) {
        self.fail_queries.store(failing, Ordering::SeqCst);
    }

    pub fn get_courier(&self, courier_id: &str) -> Option<CourierInfo> {
        self.couriers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == courier_id)
            .cloned()
    }
}

impl Default for MockCourierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CourierRegistry for MockCourierRegistry {
    async fn find_available_couriers(
        &self,
        excluding: &HashSet<CourierId>,
    ) -> DispatchResult<Vec<CourierInfo>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(DispatchError::CourierRegistry(
                "mock registry unavailable".to_string(),
            ));
        }
        Ok(self
            .couriers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.is_available() && !excluding.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn mark_busy(&self, courier_id: &str, order_id: &str) -> DispatchResult<()> {
        let mut couriers = self.couriers.lock().unwrap();
        match couriers.iter_mut().find(|c| c.id == courier_id) {
            Some(courier) => {
                courier.active_order_id = Some(order_id.to_string());
                Ok(())
            }
            None => Err(DispatchError::CourierRegistry(format!(
                "courier {} not found",
                courier_id
            ))),
        }
    }
}

/// Mock implementation of ConnectionRegistry for testing
#[derive(Debug, Clone, Default)]
pub struct MockConnectionRegistry {
    connected: Arc<Mutex<HashSet<CourierId>>>,
}

impl MockConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connected(courier_ids: &[&str]) -> Self {
        let registry = Self::new();
        for id in courier_ids {
            registry.connect(id);
        }
        registry
    }

    pub fn connect(&self, courier_id: &str) {
        self.connected
            .lock()
            .unwrap()
            .insert(courier_id.to_string());
    }

    pub fn disconnect(&self, courier_id: &str) {
        self.connected.lock().unwrap().remove(courier_id);
    }
}

#[async_trait]
impl ConnectionRegistry for MockConnectionRegistry {
    async fn connected_couriers(&self) -> DispatchResult<HashSet<CourierId>> {
        Ok(self.connected.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone)]
struct StoredOrder {
    order: ReadyOrder,
    courier_id: Option<CourierId>,
}

/// Mock implementation of OrderStore for testing
///
/// `try_assign` checks and writes under a single lock, which gives the same
/// single-winner guarantee as the conditional UPDATE in Postgres.
#[derive(Debug, Clone)]
pub struct MockOrderStore {
    orders: Arc<Mutex<HashMap<OrderId, StoredOrder>>>,
    assign_calls: Arc<AtomicUsize>,
    fail_assign: Arc<AtomicBool>,
    assign_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockOrderStore {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(Mutex::new(HashMap::new())),
            assign_calls: Arc::new(AtomicUsize::new(0)),
            fail_assign: Arc::new(AtomicBool::new(false)),
            assign_delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn insert_ready(&self, order: ReadyOrder) {
        self.orders.lock().unwrap().insert(
            order.order_id.clone(),
            StoredOrder {
                order,
                courier_id: None,
            },
        );
    }

    /// Simulate an assignment made outside the engine, e.g. by another instance
    pub fn assign_externally(&self, order_id: &str, courier_id: &str) {
        if let Some(stored) = self.orders.lock().unwrap().get_mut(order_id) {
            stored.courier_id = Some(courier_id.to_string());
        }
    }

    pub fn assigned_courier(&self, order_id: &str) -> Option<CourierId> {
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .and_then(|stored| stored.courier_id.clone())
    }

    pub fn assign_calls(&self) -> usize {
        self.assign_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent conditional writes fail with a database error
    pub fn set_failing(&self, failing: bool) {
        self.fail_assign.store(failing, Ordering::SeqCst);
    }

    /// Delay every conditional write, e.g. to stop the engine mid-accept
    pub fn set_assign_delay(&self, delay: Duration) {
        *self.assign_delay.lock().unwrap() = Some(delay);
    }
}

impl Default for MockOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MockOrderStore {
    async fn try_assign(&self, order_id: &str, courier_id: &str) -> DispatchResult<bool> {
        self.assign_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.assign_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_assign.load(Ordering::SeqCst) {
            return Err(DispatchError::OrderStore("mock store unavailable".to_string()));
        }

        let mut orders = self.orders.lock().unwrap();
        match orders.get_mut(order_id) {
            Some(stored) if stored.courier_id.is_none() => {
                stored.courier_id = Some(courier_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_unassigned_ready_orders(
        &self,
        since: DateTime<Utc>,
    ) -> DispatchResult<Vec<ReadyOrder>> {
        let mut orders: Vec<ReadyOrder> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|stored| stored.courier_id.is_none() && stored.order.ready_at >= since)
            .map(|stored| stored.order.clone())
            .collect();
        orders.sort_by_key(|order| order.ready_at);
        Ok(orders)
    }
}

/// Mock implementation of RejectionCache for testing
///
/// TTLs are recorded but never enforced.
#[derive(Debug, Clone)]
pub struct MockRejectionCache {
    entries: Arc<Mutex<HashMap<OrderId, HashSet<CourierId>>>>,
    last_ttl: Arc<Mutex<Option<Duration>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockRejectionCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            last_ttl: Arc::new(Mutex::new(None)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn seed(&self, order_id: &str, courier_ids: &[&str]) {
        self.entries
            .lock()
            .unwrap()
            .entry(order_id.to_string())
            .or_default()
            .extend(courier_ids.iter().map(|id| id.to_string()));
    }

    pub fn rejected(&self, order_id: &str) -> HashSet<CourierId> {
        self.entries
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_ttl(&self) -> Option<Duration> {
        *self.last_ttl.lock().unwrap()
    }

    /// Make subsequent writes fail
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

impl Default for MockRejectionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RejectionCache for MockRejectionCache {
    async fn load(&self, order_id: &str) -> DispatchResult<HashSet<CourierId>> {
        Ok(self.rejected(order_id))
    }

    async fn add(&self, order_id: &str, courier_id: &str, ttl: Duration) -> DispatchResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DispatchError::RejectionCache(
                "mock cache unavailable".to_string(),
            ));
        }
        self.seed(order_id, &[courier_id]);
        *self.last_ttl.lock().unwrap() = Some(ttl);
        Ok(())
    }

    async fn clear(&self, order_id: &str) -> DispatchResult<()> {
        self.entries.lock().unwrap().remove(order_id);
        Ok(())
    }
}

/// Realtime channel that records every delivered event
#[derive(Debug, Clone, Default)]
pub struct RecordingRealtimeChannel {
    delivered: Arc<Mutex<Vec<RealtimeEnvelope>>>,
    unreachable: Arc<Mutex<HashSet<CourierId>>>,
}

impl RecordingRealtimeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries to this courier fail from now on
    pub fn fail_for(&self, courier_id: &str) {
        self.unreachable
            .lock()
            .unwrap()
            .insert(courier_id.to_string());
    }

    pub fn envelopes(&self) -> Vec<RealtimeEnvelope> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn courier_events(&self, courier_id: &str) -> Vec<DispatchEvent> {
        self.events_for(&RealtimeTarget::Courier(courier_id.to_string()))
    }

    pub fn vendor_events(&self, vendor_id: &str) -> Vec<DispatchEvent> {
        self.events_for(&RealtimeTarget::Vendor(vendor_id.to_string()))
    }

    pub fn broadcast_events(&self) -> Vec<DispatchEvent> {
        self.events_for(&RealtimeTarget::AllCouriers)
    }

    /// Couriers that received an offer for the order, one entry per offer
    pub fn offered_couriers(&self, order_id: &str) -> Vec<CourierId> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter_map(|envelope| match (&envelope.target, &envelope.event) {
                (RealtimeTarget::Courier(id), DispatchEvent::Offer { order_id: o, .. })
                    if o == order_id =>
                {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Number of events of the given name sent to the vendor
    pub fn vendor_event_count(&self, vendor_id: &str, name: &str) -> usize {
        self.vendor_events(vendor_id)
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    fn events_for(&self, target: &RealtimeTarget) -> Vec<DispatchEvent> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|envelope| &envelope.target == target)
            .map(|envelope| envelope.event.clone())
            .collect()
    }

    fn record(&self, target: RealtimeTarget, event: &DispatchEvent) {
        self.delivered.lock().unwrap().push(RealtimeEnvelope {
            target,
            event: event.clone(),
        });
    }
}

#[async_trait]
impl RealtimeChannel for RecordingRealtimeChannel {
    async fn send_to_courier(&self, courier_id: &str, event: &DispatchEvent) -> DispatchResult<()> {
        if self.unreachable.lock().unwrap().contains(courier_id) {
            return Err(DispatchError::Notification(format!(
                "courier {} unreachable",
                courier_id
            )));
        }
        self.record(RealtimeTarget::Courier(courier_id.to_string()), event);
        Ok(())
    }

    async fn broadcast_to_couriers(&self, event: &DispatchEvent) -> DispatchResult<()> {
        self.record(RealtimeTarget::AllCouriers, event);
        Ok(())
    }

    async fn send_to_vendor(&self, vendor_id: &str, event: &DispatchEvent) -> DispatchResult<()> {
        self.record(RealtimeTarget::Vendor(vendor_id.to_string()), event);
        Ok(())
    }
}

/// Push notifier that records every offer
#[derive(Debug, Clone, Default)]
pub struct RecordingPushNotifier {
    pushed: Arc<Mutex<Vec<(CourierId, JobOffer)>>>,
    failing: Arc<Mutex<HashSet<CourierId>>>,
}

impl RecordingPushNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, courier_id: &str) {
        self.failing.lock().unwrap().insert(courier_id.to_string());
    }

    pub fn pushed_to(&self, courier_id: &str) -> Vec<JobOffer> {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == courier_id)
            .map(|(_, offer)| offer.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.pushed.lock().unwrap().len()
    }
}

#[async_trait]
impl PushNotifier for RecordingPushNotifier {
    async fn push_offer(&self, courier_id: &str, offer: &JobOffer) -> DispatchResult<()> {
        if self.failing.lock().unwrap().contains(courier_id) {
            return Err(DispatchError::Notification(format!(
                "push to {} rejected",
                courier_id
            )));
        }
        self.pushed
            .lock()
            .unwrap()
            .push((courier_id.to_string(), offer.clone()));
        Ok(())
    }
}
