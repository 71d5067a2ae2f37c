//! PostgreSQL实现
//!
//! 依赖的表结构（由订单服务维护）：
//!
//! ```sql
//! CREATE TABLE couriers (
//!     id               TEXT PRIMARY KEY,
//!     name             TEXT NOT NULL,
//!     is_online        BOOLEAN NOT NULL DEFAULT FALSE,
//!     latitude         DOUBLE PRECISION,
//!     longitude        DOUBLE PRECISION,
//!     current_order_id TEXT,
//!     last_seen_at     TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//!
//! CREATE TABLE orders (
//!     id          TEXT PRIMARY KEY,
//!     vendor_id   TEXT NOT NULL,
//!     customer_id TEXT NOT NULL,
//!     courier_id  TEXT REFERENCES couriers(id),
//!     status      TEXT NOT NULL,
//!     payload     JSONB NOT NULL,
//!     ready_at    TIMESTAMPTZ,
//!     assigned_at TIMESTAMPTZ
//! );
//! ```

pub mod postgres_courier_registry;
pub mod postgres_order_store;

pub use postgres_courier_registry::PostgresCourierRegistry;
pub use postgres_order_store::PostgresOrderStore;

/// 骑手身上视为"进行中"的订单状态
pub const ACTIVE_ORDER_STATUSES: [&str; 3] = ["ASSIGNED", "PICKED_UP", "OUT_FOR_DELIVERY"];

/// 等待取货的订单状态
pub const READY_FOR_PICKUP: &str = "READY_FOR_PICKUP";
