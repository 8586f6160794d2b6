//! Common types for the courier dispatch system.
//!
//! This crate defines the data model shared by every dispatch component:
//! orders and their lifecycle status, the partner registry and quotes, the
//! tracking ledger records, storage keys and configuration validation.

/// Order records and lifecycle status.
pub mod order;
/// Partner registry, resolved partners and quotes.
pub mod partner;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Storage keys for the persisted collections.
pub mod storage;
/// Tracking ledger records.
pub mod tracking;
/// Time helpers.
pub mod utils;
/// Configuration validation types.
pub mod validation;

pub use order::*;
pub use partner::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use tracking::*;
pub use utils::{current_timestamp, seconds_since};
pub use validation::*;
