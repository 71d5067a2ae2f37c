pub mod courier;
pub mod event;
pub mod job;
pub mod order;

pub use courier::*;
pub use event::*;
pub use job::*;
pub use order::*;

/// 订单标识
pub type OrderId = String;

/// 骑手标识
pub type CourierId = String;
