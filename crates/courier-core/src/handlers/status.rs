//! Status polling.
//!
//! Asks the partner of a placed order for its delivery state. Only a
//! `delivered` answer starts tracking: the partner's tracking snapshot is
//! fetched and appended to the ledger. Polling never changes order status.

use crate::ledger::TrackingLedger;
use courier_delivery::{DeliveryService, PartnerStatus};
use courier_types::{current_timestamp, Order, OrderId, Partner, TrackingEntry};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while polling or tracking an order.
#[derive(Debug, Error)]
pub enum StatusError {
	#[error("Delivery error: {0}")]
	Delivery(String),
	#[error("Ledger error: {0}")]
	Ledger(String),
}

/// What a tracking attempt achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingOutcome {
	/// The partner has not delivered yet.
	NotDelivered(PartnerStatus),
	/// A ledger entry was written.
	Recorded,
	/// The order was already in the ledger.
	AlreadyTracked,
}

/// Handler polling partners and feeding the tracking ledger.
pub struct StatusHandler {
	delivery: Arc<DeliveryService>,
	ledger: Arc<TrackingLedger>,
}

impl StatusHandler {
	pub fn new(delivery: Arc<DeliveryService>, ledger: Arc<TrackingLedger>) -> Self {
		Self { delivery, ledger }
	}

	/// Polls the partner's status endpoint for an order.
	pub async fn poll(
		&self,
		partner: &Partner,
		order_id: &OrderId,
	) -> Result<PartnerStatus, StatusError> {
		self.delivery
			.order_status(partner, order_id)
			.await
			.map_err(|e| StatusError::Delivery(e.to_string()))
	}

	/// Polls an order and, once delivered, records its tracking snapshot.
	#[instrument(skip_all, fields(order_id = %order.id, partner = %partner.name))]
	pub async fn track(
		&self,
		order: &Order,
		partner: &Partner,
	) -> Result<TrackingOutcome, StatusError> {
		let status = self.poll(partner, &order.id).await?;
		if !status.is_delivered() {
			tracing::debug!(status = %status, "Not delivered yet");
			return Ok(TrackingOutcome::NotDelivered(status));
		}

		let tracking_details = self
			.delivery
			.tracking_details(
				partner,
				&order.id,
				order.delivery_url.as_deref().unwrap_or_default(),
			)
			.await
			.map_err(|e| StatusError::Delivery(e.to_string()))?;

		let appended = self
			.ledger
			.record(TrackingEntry {
				order_id: order.id.clone(),
				tracking_details,
				order_url: order.order_url.clone(),
				delivery_url: order.delivery_url.clone(),
				recorded_at: current_timestamp(),
			})
			.await
			.map_err(|e| StatusError::Ledger(e.to_string()))?;

		Ok(if appended {
			TrackingOutcome::Recorded
		} else {
			TrackingOutcome::AlreadyTracked
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use courier_delivery::{DeliveryError, MockPartnerInterface};
	use courier_storage::implementations::memory::MemoryStorage;
	use courier_storage::StorageService;
	use courier_types::{PartnerEntry, TrackingDetail};
	use std::time::Duration;

	fn handler(gateway: MockPartnerInterface) -> (StatusHandler, Arc<TrackingLedger>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let ledger = Arc::new(TrackingLedger::new(storage));
		let delivery = Arc::new(DeliveryService::new(Box::new(gateway), Duration::from_secs(5)));
		(StatusHandler::new(delivery, ledger.clone()), ledger)
	}

	fn placed_order() -> (Order, Partner) {
		let mut order = Order::new(3, "A");
		order.order_url = "http://store/order".to_string();
		order.delivery_url = Some("http://track/3".to_string());
		let partner = Partner::resolve(&PartnerEntry::named("swift"), &order);
		(order, partner)
	}

	#[tokio::test]
	async fn test_delivered_order_is_tracked_once() {
		let mut gateway = MockPartnerInterface::new();
		gateway
			.expect_order_status()
			.returning(|_, _| Ok(PartnerStatus::Delivered));
		gateway
			.expect_tracking_details()
			.withf(|_, _, url| url.to_string() == "http://track/3")
			.returning(|_, _, _| Ok(vec![TrackingDetail::new(true)]));
		let (handler, ledger) = handler(gateway);
		let (order, partner) = placed_order();

		assert_eq!(
			handler.track(&order, &partner).await.unwrap(),
			TrackingOutcome::Recorded
		);
		assert_eq!(
			handler.track(&order, &partner).await.unwrap(),
			TrackingOutcome::AlreadyTracked
		);

		let entries = ledger.entries().await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].order_url, "http://store/order");
		assert_eq!(entries[0].delivery_url.as_deref(), Some("http://track/3"));
		assert!(entries[0].is_complete());
	}

	#[tokio::test]
	async fn test_undelivered_order_is_not_tracked() {
		let mut gateway = MockPartnerInterface::new();
		gateway
			.expect_order_status()
			.returning(|_, _| Ok(PartnerStatus::Other("in_transit".to_string())));
		gateway.expect_tracking_details().never();
		let (handler, ledger) = handler(gateway);
		let (order, partner) = placed_order();

		let outcome = handler.track(&order, &partner).await.unwrap();
		assert_eq!(
			outcome,
			TrackingOutcome::NotDelivered(PartnerStatus::Other("in_transit".to_string()))
		);
		assert!(ledger.entries().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_status_failure_is_reported() {
		let mut gateway = MockPartnerInterface::new();
		gateway
			.expect_order_status()
			.returning(|_, _| Err(DeliveryError::Timeout(Duration::from_secs(5))));
		let (handler, _) = handler(gateway);
		let (order, partner) = placed_order();

		assert!(matches!(
			handler.track(&order, &partner).await,
			Err(StatusError::Delivery(_))
		));
	}
}
