use std::collections::HashSet;

use async_trait::async_trait;
use dispatch_core::{
    CourierId, CourierInfo, CourierRegistry, DispatchError, DispatchResult, GeoPoint,
};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use super::ACTIVE_ORDER_STATUSES;

/// PostgreSQL骑手注册表
pub struct PostgresCourierRegistry {
    pool: PgPool,
}

impl PostgresCourierRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_courier(row: &sqlx::postgres::PgRow) -> DispatchResult<CourierInfo> {
        let latitude: Option<f64> = row.try_get("latitude")?;
        let longitude: Option<f64> = row.try_get("longitude")?;

        Ok(CourierInfo {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            is_online: row.try_get("is_online")?,
            location: latitude.zip(longitude).map(|(lat, lon)| GeoPoint::new(lat, lon)),
            active_order_id: row.try_get("current_order_id")?,
            last_seen_at: row.try_get("last_seen_at")?,
        })
    }
}

#[async_trait]
impl CourierRegistry for PostgresCourierRegistry {
    #[instrument(skip(self, excluding), fields(excluded = excluding.len()))]
    async fn find_available_couriers(
        &self,
        excluding: &HashSet<CourierId>,
    ) -> DispatchResult<Vec<CourierInfo>> {
        let excluded: Vec<String> = excluding.iter().cloned().collect();
        let active_statuses: Vec<String> =
            ACTIVE_ORDER_STATUSES.iter().map(|s| s.to_string()).collect();

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.is_online, c.latitude, c.longitude,
                   c.current_order_id, c.last_seen_at
            FROM couriers c
            WHERE c.is_online = TRUE
              AND c.latitude IS NOT NULL
              AND c.longitude IS NOT NULL
              AND c.current_order_id IS NULL
              AND NOT (c.id = ANY($1))
              AND NOT EXISTS (
                  SELECT 1 FROM orders o
                  WHERE o.courier_id = c.id AND o.status = ANY($2)
              )
            ORDER BY c.last_seen_at DESC, c.id ASC
            "#,
        )
        .bind(&excluded)
        .bind(&active_statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(DispatchError::Database)?;

        let couriers = rows
            .iter()
            .map(Self::row_to_courier)
            .collect::<DispatchResult<Vec<_>>>()?;

        debug!("查询到 {} 名可用骑手", couriers.len());
        Ok(couriers)
    }

    #[instrument(skip(self))]
    async fn mark_busy(&self, courier_id: &str, order_id: &str) -> DispatchResult<()> {
        sqlx::query("UPDATE couriers SET current_order_id = $2 WHERE id = $1")
            .bind(courier_id)
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(DispatchError::Database)?;

        debug!("骑手 {} 已标记为配送中: {}", courier_id, order_id);
        Ok(())
    }
}
