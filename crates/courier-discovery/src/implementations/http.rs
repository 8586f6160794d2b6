//! HTTP order source.
//!
//! Polls a store collector endpoint that answers `GET` with a JSON array of
//! raw orders.

use crate::{project_batch, DiscoveryError, OrderSourceInterface};
use async_trait::async_trait;
use courier_types::{http_url, ConfigSchema, Field, FieldType, Order, Schema, ValidationError};
use std::time::Duration;

/// Order source fetching raw orders from a collector URL.
pub struct HttpOrderSource {
	url: String,
	client: reqwest::Client,
}

impl HttpOrderSource {
	/// Creates a source for `url` whose requests time out after `timeout`.
	pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DiscoveryError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| DiscoveryError::Connection(format!("Failed to build client: {}", e)))?;

		Ok(Self {
			url: url.into(),
			client,
		})
	}
}

#[async_trait]
impl OrderSourceInterface for HttpOrderSource {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpOrderSourceSchema)
	}

	async fn fetch_orders(&self) -> Result<Vec<Order>, DiscoveryError> {
		let response = self
			.client
			.get(&self.url)
			.send()
			.await
			.and_then(|r| r.error_for_status())
			.map_err(|e| DiscoveryError::Connection(e.to_string()))?;

		let records: Vec<serde_json::Value> = response
			.json()
			.await
			.map_err(|e| DiscoveryError::ParseError(e.to_string()))?;

		Ok(project_batch(records, "http"))
	}
}

/// Configuration schema for the HTTP order source.
pub struct HttpOrderSourceSchema;

impl ConfigSchema for HttpOrderSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(http_url)],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create an HTTP order source from configuration.
///
/// Required configuration parameters:
/// - `url`: collector endpoint returning a JSON array of orders
///
/// Optional configuration parameters:
/// - `timeout_seconds`: request timeout (default: 10)
pub fn create_discovery(
	config: &toml::Value,
) -> Result<Box<dyn OrderSourceInterface>, DiscoveryError> {
	HttpOrderSourceSchema
		.validate(config)
		.map_err(|e| DiscoveryError::ValidationError(format!("Invalid configuration: {}", e)))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DiscoveryError::ValidationError("url is required".to_string()))?;

	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(10) as u64;

	Ok(Box::new(HttpOrderSource::new(
		url,
		Duration::from_secs(timeout_seconds),
	)?))
}

/// Registry for the HTTP order source.
pub struct Registry;

impl courier_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = crate::DiscoveryFactory;

	fn factory() -> Self::Factory {
		create_discovery
	}
}

impl crate::DiscoveryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{routing::get, Json, Router};
	use courier_types::OrderId;
	use serde_json::json;
	use tokio::net::TcpListener;

	async fn serve(body: serde_json::Value) -> String {
		let app = Router::new().route("/orders", get(move || async move { Json(body) }));
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}/orders", addr)
	}

	#[tokio::test]
	async fn test_fetches_orders() {
		let url = serve(json!([
			{"id": 7, "store": "A", "amount": "9.99"},
			{"id": "bad"}
		]))
		.await;

		let source = HttpOrderSource::new(url, Duration::from_secs(5)).unwrap();
		let orders = source.fetch_orders().await.unwrap();

		assert_eq!(orders.len(), 1);
		assert_eq!(orders[0].id, OrderId::from(7));
	}

	#[tokio::test]
	async fn test_non_array_body_is_a_parse_error() {
		let url = serve(json!({"orders": []})).await;

		let source = HttpOrderSource::new(url, Duration::from_secs(5)).unwrap();
		assert!(matches!(
			source.fetch_orders().await,
			Err(DiscoveryError::ParseError(_))
		));
	}

	#[test]
	fn test_rejects_non_http_url() {
		let config: toml::Value = toml::from_str("url = \"file:///tmp/orders.json\"").unwrap();
		assert!(matches!(
			create_discovery(&config),
			Err(DiscoveryError::ValidationError(_))
		));
	}
}
