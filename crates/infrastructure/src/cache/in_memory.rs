use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::{CourierId, DispatchResult, OrderId, RejectionCache};
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    couriers: HashSet<CourierId>,
    expires_at: Instant,
}

/// 进程内拒单缓存，仅适用于单实例部署
#[derive(Debug, Default)]
pub struct InMemoryRejectionCache {
    entries: RwLock<HashMap<OrderId, Entry>>,
}

impl InMemoryRejectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清理过期记录，返回清理数量
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl RejectionCache for InMemoryRejectionCache {
    async fn load(&self, order_id: &str) -> DispatchResult<HashSet<CourierId>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(order_id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.couriers.clone())
            .unwrap_or_default())
    }

    async fn add(&self, order_id: &str, courier_id: &str, ttl: Duration) -> DispatchResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let entry = entries.entry(order_id.to_string()).or_insert_with(|| Entry {
            couriers: HashSet::new(),
            expires_at: now,
        });
        if entry.expires_at <= now {
            entry.couriers.clear();
        }
        entry.couriers.insert(courier_id.to_string());
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn clear(&self, order_id: &str) -> DispatchResult<()> {
        self.entries.write().await.remove(order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = InMemoryRejectionCache::new();
        cache.add("o-1", "a", Duration::from_secs(10)).await.unwrap();
        cache.add("o-1", "b", Duration::from_secs(10)).await.unwrap();

        let loaded = cache.load("o-1").await.unwrap();
        assert_eq!(loaded.len(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.load("o-1").await.unwrap().is_empty());
        assert_eq!(cache.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = InMemoryRejectionCache::new();
        cache.add("o-1", "a", Duration::from_secs(60)).await.unwrap();
        cache.clear("o-1").await.unwrap();
        assert!(cache.load("o-1").await.unwrap().is_empty());
        assert!(cache.load("unknown").await.unwrap().is_empty());
    }
}
