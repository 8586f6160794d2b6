//! Core dispatch engine for the courier dispatch system.
//!
//! Ties the component crates together: orders flow from the configured
//! sources through intake, quoting and placement, placed orders are polled
//! until their partner reports delivery, and the reconciler settles their
//! final status from the tracking ledger.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod ledger;
pub mod reconciler;
pub mod state;

pub use builder::{BuilderError, DispatchBuilder, DispatchFactories};
pub use engine::{context::CycleContext, CycleReport, DispatchEngine, EngineError};
pub use ledger::{LedgerError, TrackingLedger};
pub use reconciler::{ReconcileError, ReconcileReport, Reconciler};
