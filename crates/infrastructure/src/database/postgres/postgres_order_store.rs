use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::{
    DispatchError, DispatchResult, OrderPayload, OrderStore, ReadyOrder,
};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};

use super::READY_FOR_PICKUP;

/// PostgreSQL订单存储
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_ready_order(row: &sqlx::postgres::PgRow) -> DispatchResult<ReadyOrder> {
        let payload: Json<OrderPayload> = row.try_get("payload")?;

        Ok(ReadyOrder {
            order_id: row.try_get("id")?,
            vendor_id: row.try_get("vendor_id")?,
            customer_id: row.try_get("customer_id")?,
            payload: payload.0,
            ready_at: row.try_get("ready_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(skip(self))]
    async fn try_assign(&self, order_id: &str, courier_id: &str) -> DispatchResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET courier_id = $2, status = 'ASSIGNED', assigned_at = now()
            WHERE id = $1 AND status = $3 AND courier_id IS NULL
            "#,
        )
        .bind(order_id)
        .bind(courier_id)
        .bind(READY_FOR_PICKUP)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::Database)?;

        let assigned = result.rows_affected() == 1;
        if assigned {
            info!("订单 {} 已分配给骑手 {}", order_id, courier_id);
        } else {
            debug!("订单 {} 条件写入未命中，骑手 {} 未能接单", order_id, courier_id);
        }

        Ok(assigned)
    }

    #[instrument(skip(self))]
    async fn find_unassigned_ready_orders(
        &self,
        since: DateTime<Utc>,
    ) -> DispatchResult<Vec<ReadyOrder>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vendor_id, customer_id, payload, ready_at
            FROM orders
            WHERE status = $1 AND courier_id IS NULL AND ready_at >= $2
            ORDER BY ready_at ASC
            "#,
        )
        .bind(READY_FOR_PICKUP)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(DispatchError::Database)?;

        let orders = rows
            .iter()
            .map(Self::row_to_ready_order)
            .collect::<DispatchResult<Vec<_>>>()?;

        debug!("查询到 {} 个待分配订单", orders.len());
        Ok(orders)
    }
}
