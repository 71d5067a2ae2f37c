pub mod postgres;

use std::time::Duration;

use dispatch_core::{DatabaseConfig, DispatchResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// 创建PostgreSQL连接池
pub async fn create_pool(config: &DatabaseConfig) -> DispatchResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect(&config.url)
        .await?;

    info!("数据库连接池已创建，最大连接数: {}", config.max_connections);
    Ok(pool)
}
