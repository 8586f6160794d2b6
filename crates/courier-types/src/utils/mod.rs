//! Small helpers shared across the dispatch crates.

pub mod helpers;

pub use helpers::{current_timestamp, seconds_since};
