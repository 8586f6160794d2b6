//! Partner gateway module for the courier dispatch system.
//!
//! This module handles every conversation with delivery partners: asking for
//! a quote, placing an order, polling its status and fetching the tracking
//! snapshot. Implementations are selected by configuration; the
//! [`DeliveryService`] wraps the primary one and bounds every call with a
//! timeout so a stalled partner cannot hold up a cycle.

use async_trait::async_trait;
use courier_types::{ConfigSchema, ImplementationRegistry, Order, OrderId, Partner, TrackingDetail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod simulated;
}

/// Errors that can occur while talking to a delivery partner.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The partner answered with something that could not be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The partner did not answer within the configured timeout.
	#[error("Request timed out after {0:?}")]
	Timeout(Duration),
	/// Error that occurs when the gateway configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Body of a quote request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
	pub pickup_location: serde_json::Value,
	pub drop_location: serde_json::Value,
	pub order_id: OrderId,
}

/// Body of a quote response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteResponse {
	pub price: Decimal,
}

/// Body of an order placement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRequest {
	pub pickup_location: serde_json::Value,
	pub drop_location: serde_json::Value,
	pub customer_data: serde_json::Value,
	pub order_id: OrderId,
}

impl PlacementRequest {
	/// Builds the placement body for an order.
	pub fn for_order(order: &Order) -> Self {
		Self {
			pickup_location: order.pickup.clone(),
			drop_location: order.drop.clone(),
			customer_data: order.customer.clone(),
			order_id: order.id.clone(),
		}
	}
}

/// Partner acknowledgement of a placement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResponse {
	#[serde(default)]
	pub success: bool,
	#[serde(default)]
	pub delivery_url: Option<String>,
	#[serde(default)]
	pub order_id: Option<OrderId>,
}

/// Body of a status request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
	pub order_id: OrderId,
}

/// Body of a status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
	pub status: String,
}

/// Delivery state reported by a partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerStatus {
	/// The partner reports the order as delivered. Tracking starts.
	Delivered,
	/// Any other partner-specific token, kept verbatim.
	Other(String),
}

impl PartnerStatus {
	/// Interprets a raw status token. Matching is case-insensitive.
	pub fn from_token(token: &str) -> Self {
		if token.trim().eq_ignore_ascii_case("delivered") {
			PartnerStatus::Delivered
		} else {
			PartnerStatus::Other(token.to_string())
		}
	}

	pub fn is_delivered(&self) -> bool {
		matches!(self, PartnerStatus::Delivered)
	}
}

impl std::fmt::Display for PartnerStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			PartnerStatus::Delivered => write!(f, "delivered"),
			PartnerStatus::Other(token) => write!(f, "{}", token),
		}
	}
}

/// Trait defining the interface for partner gateways.
///
/// Every method addresses one resolved [`Partner`]; the gateway decides how
/// the partner's endpoints are reached.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PartnerInterface: Send + Sync {
	/// Returns the configuration schema for this gateway.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Asks a partner for the price of delivering an order.
	async fn quote(&self, partner: &Partner, order: &Order) -> Result<Decimal, DeliveryError>;

	/// Submits an order to a partner's order endpoint.
	async fn place_order(
		&self,
		partner: &Partner,
		request: &PlacementRequest,
	) -> Result<PlacementResponse, DeliveryError>;

	/// Polls a partner's status endpoint for an order.
	async fn order_status(
		&self,
		partner: &Partner,
		order_id: &OrderId,
	) -> Result<PartnerStatus, DeliveryError>;

	/// Fetches the tracking snapshot for a placed order.
	async fn tracking_details(
		&self,
		partner: &Partner,
		order_id: &OrderId,
		delivery_url: &str,
	) -> Result<Vec<TrackingDetail>, DeliveryError>;
}

/// Type alias for gateway factory functions.
pub type DeliveryFactory = fn(&toml::Value) -> Result<Box<dyn PartnerInterface>, DeliveryError>;

/// Registry trait for gateway implementations.
pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// Get all registered gateway implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::{http, simulated};

	vec![
		(simulated::Registry::NAME, simulated::Registry::factory()),
		(http::Registry::NAME, http::Registry::factory()),
	]
}

/// Service wrapping the primary partner gateway.
///
/// Each call is bounded by `request_timeout`; an expired call reports
/// [`DeliveryError::Timeout`].
pub struct DeliveryService {
	gateway: Box<dyn PartnerInterface>,
	request_timeout: Duration,
}

impl DeliveryService {
	/// Creates a new DeliveryService around a gateway.
	pub fn new(gateway: Box<dyn PartnerInterface>, request_timeout: Duration) -> Self {
		Self {
			gateway,
			request_timeout,
		}
	}

	async fn bounded<T>(
		&self,
		call: impl Future<Output = Result<T, DeliveryError>>,
	) -> Result<T, DeliveryError> {
		tokio::time::timeout(self.request_timeout, call)
			.await
			.map_err(|_| DeliveryError::Timeout(self.request_timeout))?
	}

	/// Requests a quote from one partner.
	pub async fn quote(&self, partner: &Partner, order: &Order) -> Result<Decimal, DeliveryError> {
		self.bounded(self.gateway.quote(partner, order)).await
	}

	/// Places an order with a partner.
	pub async fn place_order(
		&self,
		partner: &Partner,
		request: &PlacementRequest,
	) -> Result<PlacementResponse, DeliveryError> {
		self.bounded(self.gateway.place_order(partner, request))
			.await
	}

	/// Polls the delivery status of an order.
	pub async fn order_status(
		&self,
		partner: &Partner,
		order_id: &OrderId,
	) -> Result<PartnerStatus, DeliveryError> {
		self.bounded(self.gateway.order_status(partner, order_id))
			.await
	}

	/// Fetches the tracking snapshot of an order.
	pub async fn tracking_details(
		&self,
		partner: &Partner,
		order_id: &OrderId,
		delivery_url: &str,
	) -> Result<Vec<TrackingDetail>, DeliveryError> {
		self.bounded(
			self.gateway
				.tracking_details(partner, order_id, delivery_url),
		)
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use courier_types::{PartnerEntry, Schema, ValidationError};

	struct SlowGateway;

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	#[async_trait]
	impl PartnerInterface for SlowGateway {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}

		async fn quote(&self, _partner: &Partner, _order: &Order) -> Result<Decimal, DeliveryError> {
			tokio::time::sleep(Duration::from_secs(60)).await;
			Ok(Decimal::ONE)
		}

		async fn place_order(
			&self,
			_partner: &Partner,
			request: &PlacementRequest,
		) -> Result<PlacementResponse, DeliveryError> {
			Ok(PlacementResponse {
				success: true,
				delivery_url: Some("http://track/1".to_string()),
				order_id: Some(request.order_id.clone()),
			})
		}

		async fn order_status(
			&self,
			_partner: &Partner,
			_order_id: &OrderId,
		) -> Result<PartnerStatus, DeliveryError> {
			Ok(PartnerStatus::Delivered)
		}

		async fn tracking_details(
			&self,
			_partner: &Partner,
			_order_id: &OrderId,
			_delivery_url: &str,
		) -> Result<Vec<TrackingDetail>, DeliveryError> {
			Ok(vec![])
		}
	}

	fn partner_and_order() -> (Partner, Order) {
		let order = Order::new(1, "A");
		(Partner::resolve(&PartnerEntry::named("swift"), &order), order)
	}

	#[tokio::test(start_paused = true)]
	async fn test_calls_are_bounded_by_timeout() {
		let service = DeliveryService::new(Box::new(SlowGateway), Duration::from_secs(10));
		let (partner, order) = partner_and_order();

		let result = service.quote(&partner, &order).await;
		assert!(matches!(result, Err(DeliveryError::Timeout(d)) if d == Duration::from_secs(10)));

		let placed = service
			.place_order(&partner, &PlacementRequest::for_order(&order))
			.await
			.unwrap();
		assert!(placed.success);
	}

	#[test]
	fn test_status_tokens() {
		assert!(PartnerStatus::from_token("delivered").is_delivered());
		assert!(PartnerStatus::from_token("Delivered ").is_delivered());
		assert_eq!(
			PartnerStatus::from_token("in_transit"),
			PartnerStatus::Other("in_transit".to_string())
		);
	}

	#[test]
	fn test_placement_request_shape() {
		let mut order = Order::new(5, "A");
		order.customer = serde_json::json!("Ada");
		let body = serde_json::to_value(PlacementRequest::for_order(&order)).unwrap();
		assert_eq!(body["orderId"], 5);
		assert_eq!(body["customerData"], "Ada");
		assert!(body.get("pickupLocation").is_some());
		assert!(body.get("dropLocation").is_some());
	}
}
