//! # Dispatch Testing Utils
//!
//! Shared testing utilities for the courier dispatch engine.
//! This crate provides in-memory implementations of every collaborator trait,
//! test data builders, and helpers for async tests.
//!
//! ## Features
//!
//! - **Mock Stores**: In-memory order store with an atomic conditional assign
//! - **Mock Registries**: Courier and connection registries backed by plain collections
//! - **Recording Channels**: Realtime and push notifiers that record every delivery
//! - **Test Data Builders**: Builders for ready orders and couriers
//!
//! ## Usage
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! dispatch-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use helpers::*;
pub use mocks::*;
