use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::{CourierId, DispatchError, DispatchResult, RejectionCache};
use redis::aio::ConnectionManager;
use tracing::{debug, error, info, instrument};

use super::rejection_cache_key;

/// 基于Redis集合的拒单缓存
///
/// 每个订单一个集合，追加时一并刷新过期时间，多个派单实例共享。
#[derive(Clone)]
pub struct RedisRejectionCache {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisRejectionCache {
    /// 连接Redis并验证可用性
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> DispatchResult<Self> {
        info!("创建Redis拒单缓存: {}", redis_url);

        let client = redis::Client::open(redis_url)
            .map_err(|e| DispatchError::RejectionCache(e.to_string()))?;

        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| DispatchError::RejectionCache(e.to_string()))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| DispatchError::RejectionCache(e.to_string()))?;

        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, order_id: &str) -> String {
        rejection_cache_key(&self.key_prefix, order_id)
    }
}

#[async_trait]
impl RejectionCache for RedisRejectionCache {
    #[instrument(skip(self))]
    async fn load(&self, order_id: &str) -> DispatchResult<HashSet<CourierId>> {
        let key = self.key(order_id);
        let mut conn = self.conn.clone();

        let members: HashSet<String> = redis::cmd("SMEMBERS")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("读取拒单记录失败 {}: {}", key, e);
                DispatchError::RejectionCache(e.to_string())
            })?;

        debug!("读取拒单记录 {}: {} 条", key, members.len());
        Ok(members)
    }

    #[instrument(skip(self))]
    async fn add(&self, order_id: &str, courier_id: &str, ttl: Duration) -> DispatchResult<()> {
        let key = self.key(order_id);
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&key)
            .arg(courier_id)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl.as_secs().max(1))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("写入拒单记录失败 {}: {}", key, e);
                DispatchError::RejectionCache(e.to_string())
            })?;

        debug!("写入拒单记录 {} <- {}", key, courier_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self, order_id: &str) -> DispatchResult<()> {
        let key = self.key(order_id);
        let mut conn = self.conn.clone();

        let _: i64 = redis::cmd("DEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| DispatchError::RejectionCache(e.to_string()))?;

        Ok(())
    }
}
