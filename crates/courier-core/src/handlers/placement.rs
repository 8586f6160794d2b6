//! Order placement.
//!
//! Submits a quoted order to the winning partner. An accepted placement
//! moves the order from Pending to Placed and records the partner and its
//! delivery URL; anything else leaves the order Pending for the next cycle.

use crate::state::OrderStateMachine;
use courier_delivery::{DeliveryService, PlacementRequest};
use courier_types::{Order, OrderStatus, Partner};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during order placement.
#[derive(Debug, Error)]
pub enum PlacementError {
	/// The partner could not be reached or answered garbage.
	#[error("Delivery error: {0}")]
	Delivery(String),
	/// The order could not be moved to Placed.
	#[error("State error: {0}")]
	State(String),
}

/// Result of a placement attempt that reached the partner.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
	/// The partner accepted the order, which is now Placed.
	Placed {
		order: Order,
		delivery_url: Option<String>,
	},
	/// The partner declined; the order stays Pending.
	Rejected,
}

/// Handler submitting orders to delivery partners.
pub struct PlacementHandler {
	delivery: Arc<DeliveryService>,
	state_machine: Arc<OrderStateMachine>,
}

impl PlacementHandler {
	pub fn new(delivery: Arc<DeliveryService>, state_machine: Arc<OrderStateMachine>) -> Self {
		Self {
			delivery,
			state_machine,
		}
	}

	/// Places `order` with `partner`.
	#[instrument(skip_all, fields(order_id = %order.id, partner = %partner.name))]
	pub async fn place(
		&self,
		order: &Order,
		partner: &Partner,
	) -> Result<PlacementOutcome, PlacementError> {
		let request = PlacementRequest::for_order(order);
		let response = self
			.delivery
			.place_order(partner, &request)
			.await
			.map_err(|e| PlacementError::Delivery(e.to_string()))?;

		if !response.success {
			tracing::warn!("Partner declined the order");
			return Ok(PlacementOutcome::Rejected);
		}

		let delivery_url = response.delivery_url.filter(|url| !url.is_empty());
		let partner_name = partner.name.clone();
		let recorded_url = delivery_url.clone();
		let placed = self
			.state_machine
			.update_order_with(&order.id, move |o| {
				OrderStateMachine::apply_transition(o, OrderStatus::Placed)?;
				o.partner = Some(partner_name);
				o.delivery_url = recorded_url;
				Ok(())
			})
			.await
			.map_err(|e| PlacementError::State(e.to_string()))?;

		tracing::info!(delivery_url = ?delivery_url, "Order placed");
		Ok(PlacementOutcome::Placed {
			order: placed,
			delivery_url,
		})
	}
}
