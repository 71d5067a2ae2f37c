pub mod couriers;
pub mod health;
pub mod orders;
