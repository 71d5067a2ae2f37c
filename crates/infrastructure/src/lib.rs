pub mod cache;
pub mod database;
pub mod observability;
pub mod push;
pub mod realtime;

pub use cache::{InMemoryRejectionCache, RedisRejectionCache};
pub use database::postgres::{PostgresCourierRegistry, PostgresOrderStore};
pub use observability::MetricsCollector;
pub use push::{HttpPushNotifier, NoopPushNotifier};
pub use realtime::{
    BroadcastRealtimeChannel, InMemoryConnectionRegistry, RealtimeEnvelope, RealtimeTarget,
};
