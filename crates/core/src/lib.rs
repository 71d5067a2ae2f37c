pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use models::{
    CourierId, CourierInfo, DispatchEvent, DispatchJob, GeoPoint, JobOffer, JobStatus, OrderId,
    OrderItem, OrderPayload, ReadyOrder, RemovalReason,
};
pub use traits::{
    ConnectionRegistry, CourierRegistry, OrderStore, PushNotifier, RealtimeChannel,
    RejectionCache,
};
