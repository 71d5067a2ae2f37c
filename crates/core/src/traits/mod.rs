pub mod notifier;
pub mod registry;
pub mod store;

pub use notifier::*;
pub use registry::*;
pub use store::*;
