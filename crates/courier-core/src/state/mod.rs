//! State management for orders.
//!
//! Provides the order state machine that guards every status write.

pub mod order;

pub use order::{OrderStateError, OrderStateMachine};
