//! Pipeline stage handlers.
//!
//! One handler per stage of the order lifecycle: intake of new orders,
//! quoting, placement with the winning partner and status polling that
//! feeds the tracking ledger.

pub mod intake;
pub mod placement;
pub mod quote;
pub mod status;

pub use intake::{IntakeError, IntakeHandler};
pub use placement::{PlacementError, PlacementHandler, PlacementOutcome};
pub use quote::{QuoteError, QuoteHandler};
pub use status::{StatusError, StatusHandler, TrackingOutcome};
