//! Simulated partner gateway.
//!
//! Answers every partner call locally: quotes are pseudo-random whole
//! amounts below `max_quote`, placements are accepted, status polls report
//! `delivered` and tracking returns a fixed snapshot. Per-partner price
//! overrides make quote selection deterministic for demos and tests.

use crate::{
	DeliveryError, DeliveryFactory, DeliveryRegistry, PartnerInterface, PartnerStatus,
	PlacementRequest, PlacementResponse,
};
use async_trait::async_trait;
use courier_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Order, OrderId, Partner, Schema,
	TrackingDetail, ValidationError,
};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for the simulated gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedGatewayConfig {
	/// Exclusive upper bound of generated quotes.
	#[serde(default = "default_max_quote")]
	pub max_quote: u64,
	/// Fixed quotes by partner name.
	#[serde(default)]
	pub price_overrides: HashMap<String, Decimal>,
	/// Whether placements are accepted.
	#[serde(default = "default_placement_success")]
	pub placement_success: bool,
	/// Status token returned by status polls.
	#[serde(default = "default_status")]
	pub status: String,
	/// Completion flag of the single tracking event returned.
	#[serde(default = "default_tracking_completed")]
	pub tracking_completed: bool,
	/// Base of the delivery URLs handed out on placement.
	#[serde(default = "default_delivery_url_base")]
	pub delivery_url_base: String,
}

fn default_max_quote() -> u64 {
	200
}

fn default_placement_success() -> bool {
	true
}

fn default_status() -> String {
	"delivered".to_string()
}

fn default_tracking_completed() -> bool {
	true
}

fn default_delivery_url_base() -> String {
	"https://mock.delivery.url".to_string()
}

impl Default for SimulatedGatewayConfig {
	fn default() -> Self {
		Self {
			max_quote: default_max_quote(),
			price_overrides: HashMap::new(),
			placement_success: default_placement_success(),
			status: default_status(),
			tracking_completed: default_tracking_completed(),
			delivery_url_base: default_delivery_url_base(),
		}
	}
}

/// Configuration schema for the simulated gateway.
pub struct SimulatedGatewaySchema;

impl ConfigSchema for SimulatedGatewaySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"max_quote",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("price_overrides", FieldType::Map(Box::new(FieldType::Number))),
				Field::new("placement_success", FieldType::Boolean),
				Field::new("status", FieldType::String),
				Field::new("tracking_completed", FieldType::Boolean),
				Field::new("delivery_url_base", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Partner gateway that never leaves the process.
pub struct SimulatedGateway {
	config: SimulatedGatewayConfig,
}

impl SimulatedGateway {
	pub fn new(config: SimulatedGatewayConfig) -> Self {
		Self { config }
	}
}

#[async_trait]
impl PartnerInterface for SimulatedGateway {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedGatewaySchema)
	}

	async fn quote(&self, partner: &Partner, order: &Order) -> Result<Decimal, DeliveryError> {
		if let Some(price) = self.config.price_overrides.get(&partner.name) {
			return Ok(*price);
		}

		let price = rand::thread_rng().gen_range(0..self.config.max_quote.max(1));
		tracing::trace!(partner = %partner.name, order_id = %order.id, price, "Simulated quote");
		Ok(Decimal::from(price))
	}

	async fn place_order(
		&self,
		partner: &Partner,
		request: &PlacementRequest,
	) -> Result<PlacementResponse, DeliveryError> {
		tracing::debug!(
			partner = %partner.name,
			endpoint = %partner.order_endpoint,
			order_id = %request.order_id,
			"Simulated placement"
		);

		if !self.config.placement_success {
			return Ok(PlacementResponse {
				success: false,
				delivery_url: None,
				order_id: Some(request.order_id.clone()),
			});
		}

		Ok(PlacementResponse {
			success: true,
			delivery_url: Some(format!(
				"{}/{}",
				self.config.delivery_url_base.trim_end_matches('/'),
				request.order_id
			)),
			order_id: Some(request.order_id.clone()),
		})
	}

	async fn order_status(
		&self,
		_partner: &Partner,
		_order_id: &OrderId,
	) -> Result<PartnerStatus, DeliveryError> {
		Ok(PartnerStatus::from_token(&self.config.status))
	}

	async fn tracking_details(
		&self,
		_partner: &Partner,
		_order_id: &OrderId,
		_delivery_url: &str,
	) -> Result<Vec<TrackingDetail>, DeliveryError> {
		Ok(vec![TrackingDetail::new(self.config.tracking_completed)])
	}
}

/// Factory function to create a simulated gateway from configuration.
///
/// Optional configuration parameters:
/// - `max_quote`: exclusive upper bound of random quotes (default: 200)
/// - `price_overrides`: table of partner name -> fixed quote
/// - `placement_success`: whether placements are accepted (default: true)
/// - `status`: status token reported by polls (default: "delivered")
/// - `tracking_completed`: completion flag of the tracking snapshot (default: true)
/// - `delivery_url_base`: base of generated delivery URLs
pub fn create_gateway(config: &toml::Value) -> Result<Box<dyn PartnerInterface>, DeliveryError> {
	SimulatedGatewaySchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(format!("Invalid configuration: {}", e)))?;

	let gateway_config: SimulatedGatewayConfig = config
		.clone()
		.try_into()
		.map_err(|e| DeliveryError::Configuration(format!("Invalid simulated config: {}", e)))?;

	Ok(Box::new(SimulatedGateway::new(gateway_config)))
}

/// Registry for the simulated gateway.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "simulated";
	type Factory = DeliveryFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl DeliveryRegistry for Registry {}
