//! HTTP partner gateway.
//!
//! Talks JSON to the partner endpoints:
//! - `POST quoteEndpoint {pickupLocation, dropLocation, orderId}` -> `{price}`
//! - `POST orderEndpoint {pickupLocation, dropLocation, customerData, orderId}`
//!   -> `{success, deliveryUrl, orderId}`
//! - `POST statusEndpoint {orderId}` -> `{status}`
//! - `GET deliveryUrl` -> `[{completed, ...}]`

use crate::{
	DeliveryError, DeliveryFactory, DeliveryRegistry, PartnerInterface, PartnerStatus,
	PlacementRequest, PlacementResponse, QuoteRequest, QuoteResponse, StatusRequest,
	StatusResponse,
};
use async_trait::async_trait;
use courier_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Order, OrderId, Partner, Schema,
	TrackingDetail, ValidationError,
};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Configuration schema for the HTTP gateway.
pub struct HttpGatewaySchema;

impl ConfigSchema for HttpGatewaySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"pool_max_idle_per_host",
					FieldType::Integer {
						min: Some(0),
						max: Some(1024),
					},
				),
				Field::new("user_agent", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Partner gateway speaking JSON over HTTP.
pub struct HttpGateway {
	client: reqwest::Client,
}

impl HttpGateway {
	pub fn new(client: reqwest::Client) -> Self {
		Self { client }
	}

	async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, DeliveryError>
	where
		B: Serialize + Sync,
		R: DeserializeOwned + Send,
	{
		if url.is_empty() {
			return Err(DeliveryError::Configuration(
				"Partner endpoint is not configured".to_string(),
			));
		}

		let response = self
			.client
			.post(url)
			.json(body)
			.send()
			.await
			.and_then(|r| r.error_for_status())
			.map_err(|e| DeliveryError::Network(format!("{}: {}", url, e)))?;

		response
			.json::<R>()
			.await
			.map_err(|e| DeliveryError::InvalidResponse(format!("{}: {}", url, e)))
	}
}

#[async_trait]
impl PartnerInterface for HttpGateway {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpGatewaySchema)
	}

	async fn quote(&self, partner: &Partner, order: &Order) -> Result<Decimal, DeliveryError> {
		let request = QuoteRequest {
			pickup_location: order.pickup.clone(),
			drop_location: order.drop.clone(),
			order_id: order.id.clone(),
		};
		let response: QuoteResponse = self.post_json(&partner.quote_endpoint, &request).await?;
		Ok(response.price)
	}

	async fn place_order(
		&self,
		partner: &Partner,
		request: &PlacementRequest,
	) -> Result<PlacementResponse, DeliveryError> {
		self.post_json(&partner.order_endpoint, request).await
	}

	async fn order_status(
		&self,
		partner: &Partner,
		order_id: &OrderId,
	) -> Result<PartnerStatus, DeliveryError> {
		let request = StatusRequest {
			order_id: order_id.clone(),
		};
		let response: StatusResponse = self.post_json(&partner.status_endpoint, &request).await?;
		Ok(PartnerStatus::from_token(&response.status))
	}

	async fn tracking_details(
		&self,
		_partner: &Partner,
		order_id: &OrderId,
		delivery_url: &str,
	) -> Result<Vec<TrackingDetail>, DeliveryError> {
		if delivery_url.is_empty() {
			return Err(DeliveryError::InvalidResponse(format!(
				"No delivery URL recorded for order {}",
				order_id
			)));
		}

		let response = self
			.client
			.get(delivery_url)
			.send()
			.await
			.and_then(|r| r.error_for_status())
			.map_err(|e| DeliveryError::Network(format!("{}: {}", delivery_url, e)))?;

		response
			.json()
			.await
			.map_err(|e| DeliveryError::InvalidResponse(format!("{}: {}", delivery_url, e)))
	}
}

/// Factory function to create an HTTP gateway from configuration.
///
/// Optional configuration parameters:
/// - `pool_max_idle_per_host`: idle connections kept per partner host (default: 10)
/// - `user_agent`: user agent sent with every request
///
/// Request timeouts are enforced by the delivery service.
pub fn create_gateway(config: &toml::Value) -> Result<Box<dyn PartnerInterface>, DeliveryError> {
	HttpGatewaySchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(format!("Invalid configuration: {}", e)))?;

	let pool_max_idle = config
		.get("pool_max_idle_per_host")
		.and_then(|v| v.as_integer())
		.unwrap_or(10) as usize;

	let mut builder = reqwest::Client::builder()
		.pool_idle_timeout(Duration::from_secs(90))
		.pool_max_idle_per_host(pool_max_idle);
	if let Some(agent) = config.get("user_agent").and_then(|v| v.as_str()) {
		builder = builder.user_agent(agent);
	}

	let client = builder
		.build()
		.map_err(|e| DeliveryError::Configuration(format!("Failed to build client: {}", e)))?;

	Ok(Box::new(HttpGateway::new(client)))
}

/// Registry for the HTTP gateway.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = DeliveryFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl DeliveryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{
		routing::{get, post},
		Json, Router,
	};
	use courier_types::PartnerEntry;
	use serde_json::{json, Value};
	use tokio::net::TcpListener;

	async fn partner_server() -> String {
		let app = Router::new()
			.route("/quote", post(|| async { Json(json!({"price": "42.50"})) }))
			.route(
				"/order",
				post(|Json(body): Json<Value>| async move {
					Json(json!({
						"success": true,
						"deliveryUrl": "http://tracking/1",
						"orderId": body["orderId"],
					}))
				}),
			)
			.route("/status", post(|| async { Json(json!({"status": "in_transit"})) }))
			.route(
				"/track",
				get(|| async { Json(json!([{"completed": true, "step": "picked"}, {"completed": false}])) }),
			);

		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}", addr)
	}

	fn partner_at(base: &str) -> Partner {
		let entry = PartnerEntry {
			name: "swift".to_string(),
			quote_url: Some(format!("{}/quote", base)),
			order_url: Some(format!("{}/order", base)),
			status_url: Some(format!("{}/status", base)),
		};
		Partner::resolve(&entry, &Order::new(1, "A"))
	}

	#[tokio::test]
	async fn test_partner_round_trip() {
		let base = partner_server().await;
		let partner = partner_at(&base);
		let gateway = create_gateway(&toml::Value::Table(Default::default())).unwrap();
		let order = Order::new(1, "A");

		let price = gateway.quote(&partner, &order).await.unwrap();
		assert_eq!(price, Decimal::new(4250, 2));

		let placed = gateway
			.place_order(&partner, &PlacementRequest::for_order(&order))
			.await
			.unwrap();
		assert!(placed.success);
		assert_eq!(placed.order_id, Some(OrderId::from(1)));

		let status = gateway.order_status(&partner, &order.id).await.unwrap();
		assert_eq!(status, PartnerStatus::Other("in_transit".to_string()));

		let details = gateway
			.tracking_details(&partner, &order.id, &format!("{}/track", base))
			.await
			.unwrap();
		assert_eq!(details.len(), 2);
		assert!(details[0].completed);
		assert_eq!(details[0].extra["step"], "picked");
	}

	#[tokio::test]
	async fn test_unreachable_partner_is_a_network_error() {
		let gateway = create_gateway(&toml::Value::Table(Default::default())).unwrap();
		let order = Order::new(1, "A");
		let partner = partner_at("http://127.0.0.1:9");

		assert!(matches!(
			gateway.quote(&partner, &order).await,
			Err(DeliveryError::Network(_))
		));
	}

	#[tokio::test]
	async fn test_missing_delivery_url() {
		let gateway = create_gateway(&toml::Value::Table(Default::default())).unwrap();
		let order = Order::new(1, "A");

		assert!(matches!(
			gateway
				.tracking_details(&partner_at("http://x"), &order.id, "")
				.await,
			Err(DeliveryError::InvalidResponse(_))
		));
	}
}
