//! 拒单记录缓存
//!
//! 多实例部署使用Redis实现，单实例部署可使用进程内实现。

pub mod in_memory;
pub mod redis_rejection_cache;

pub use in_memory::InMemoryRejectionCache;
pub use redis_rejection_cache::RedisRejectionCache;

/// 拒单记录的缓存键
pub fn rejection_cache_key(prefix: &str, order_id: &str) -> String {
    if prefix.is_empty() {
        format!("rejections:{order_id}")
    } else {
        format!("{prefix}:rejections:{order_id}")
    }
}
