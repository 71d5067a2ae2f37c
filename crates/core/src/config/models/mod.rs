pub mod api;
pub mod app_config;
pub mod database;
pub mod dispatcher;
pub mod observability;
pub mod push;
pub mod redis;

pub use api::ApiConfig;
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use dispatcher::{DispatcherConfig, SelectionStrategyKind};
pub use observability::ObservabilityConfig;
pub use push::PushConfig;
pub use redis::RedisConfig;
