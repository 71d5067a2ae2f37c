pub mod models;

pub use models::{
    ApiConfig, AppConfig, DatabaseConfig, DispatcherConfig, ObservabilityConfig, PushConfig, RedisConfig,
    SelectionStrategyKind,
};
