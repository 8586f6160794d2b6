//! Order discovery module for the courier dispatch system.
//!
//! This module handles fetching raw store orders from the configured order
//! sources and loading the partner registry that describes which stores
//! already have a delivery partner and which partners can be quoted.
//!
//! Raw records are projected onto [`Order`]: unknown keys are dropped and a
//! record that cannot be interpreted as an order is skipped with a warning
//! instead of failing the whole batch.

use async_trait::async_trait;
use courier_types::{ConfigSchema, ImplementationRegistry, Order, PartnerRegistry};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod http;
}

/// Errors that can occur during order discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	/// Error that occurs when reaching a remote order source fails.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Error that occurs when reading a local source fails.
	#[error("IO error: {0}")]
	Io(String),
	/// Error that occurs when parsing or decoding data fails.
	#[error("Parse error: {0}")]
	ParseError(String),
	/// Error that occurs when validating source configuration.
	#[error("Validation error: {0}")]
	ValidationError(String),
}

/// Trait defining the interface for order sources.
///
/// A source returns the full batch of orders it currently knows about. The
/// batch may repeat orders seen in earlier cycles; deduplication happens at
/// intake.
#[async_trait]
pub trait OrderSourceInterface: Send + Sync {
	/// Returns the configuration schema for this source.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Fetches the current batch of raw orders.
	async fn fetch_orders(&self) -> Result<Vec<Order>, DiscoveryError>;
}

/// Type alias for order source factory functions.
pub type DiscoveryFactory = fn(&toml::Value) -> Result<Box<dyn OrderSourceInterface>, DiscoveryError>;

/// Registry trait for order source implementations.
pub trait DiscoveryRegistry: ImplementationRegistry<Factory = DiscoveryFactory> {}

/// Get all registered order source implementations.
///
/// Returns a vector of (name, factory) tuples for all available sources.
pub fn get_all_implementations() -> Vec<(&'static str, DiscoveryFactory)> {
	use implementations::{file, http};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(http::Registry::NAME, http::Registry::factory()),
	]
}

/// Projects a batch of raw JSON records onto orders.
///
/// Records that do not deserialize are logged and left out.
pub(crate) fn project_batch(records: Vec<serde_json::Value>, source: &str) -> Vec<Order> {
	records
		.into_iter()
		.enumerate()
		.filter_map(|(index, record)| match serde_json::from_value::<Order>(record) {
			Ok(order) => Some(order),
			Err(e) => {
				tracing::warn!(
					source = %source,
					index = index,
					error = %e,
					"Skipping malformed order record"
				);
				None
			},
		})
		.collect()
}

/// Service that manages the configured order sources and the partner registry.
pub struct DiscoveryService {
	/// Order sources keyed by their configured name, in configuration order.
	implementations: Vec<(String, Box<dyn OrderSourceInterface>)>,
	/// Location of the partner registry document.
	registry_path: PathBuf,
}

impl DiscoveryService {
	/// Creates a new DiscoveryService with the given sources and registry file.
	pub fn new(
		implementations: Vec<(String, Box<dyn OrderSourceInterface>)>,
		registry_path: impl Into<PathBuf>,
	) -> Self {
		Self {
			implementations,
			registry_path: registry_path.into(),
		}
	}

	/// Fetches and concatenates the batches of every source.
	///
	/// A source that fails is logged and skipped; the others still
	/// contribute their orders.
	pub async fn fetch_all(&self) -> Vec<Order> {
		let mut orders = Vec::new();
		for (name, source) in &self.implementations {
			match source.fetch_orders().await {
				Ok(batch) => {
					tracing::debug!(source = %name, count = batch.len(), "Fetched orders");
					orders.extend(batch);
				},
				Err(e) => {
					tracing::warn!(source = %name, error = %e, "Order source failed, skipping");
				},
			}
		}
		orders
	}

	/// Reads the partner registry.
	///
	/// Called at the start of every cycle so edits to the registry file take
	/// effect without a restart.
	pub async fn load_registry(&self) -> Result<PartnerRegistry, DiscoveryError> {
		load_registry(&self.registry_path).await
	}

	/// Path of the partner registry document.
	pub fn registry_path(&self) -> &Path {
		&self.registry_path
	}
}

/// Reads and parses a partner registry document.
pub async fn load_registry(path: &Path) -> Result<PartnerRegistry, DiscoveryError> {
	let content = tokio::fs::read(path)
		.await
		.map_err(|e| DiscoveryError::Io(format!("{}: {}", path.display(), e)))?;
	serde_json::from_slice(&content)
		.map_err(|e| DiscoveryError::ParseError(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use courier_types::{OrderId, Schema, ValidationError};
	use serde_json::json;
	use tempfile::TempDir;

	struct StaticSource(Result<Vec<Order>, String>);

	struct EmptySchema;

	impl ConfigSchema for EmptySchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	#[async_trait]
	impl OrderSourceInterface for StaticSource {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(EmptySchema)
		}

		async fn fetch_orders(&self) -> Result<Vec<Order>, DiscoveryError> {
			self.0.clone().map_err(DiscoveryError::Connection)
		}
	}

	#[tokio::test]
	async fn test_fetch_all_skips_failing_source() {
		let service = DiscoveryService::new(
			vec![
				(
					"first".to_string(),
					Box::new(StaticSource(Ok(vec![Order::new(1, "A")]))) as Box<dyn OrderSourceInterface>,
				),
				(
					"broken".to_string(),
					Box::new(StaticSource(Err("refused".to_string()))) as Box<dyn OrderSourceInterface>,
				),
				(
					"second".to_string(),
					Box::new(StaticSource(Ok(vec![Order::new(2, "B")]))) as Box<dyn OrderSourceInterface>,
				),
			],
			"registry.json",
		);

		let orders = service.fetch_all().await;
		let ids: Vec<_> = orders.iter().map(|o| o.id.clone()).collect();
		assert_eq!(ids, vec![OrderId::from(1), OrderId::from(2)]);
	}

	#[test]
	fn test_project_batch_drops_malformed_records() {
		let orders = project_batch(
			vec![
				json!({"id": 1, "store": "A", "extra": "ignored"}),
				json!({"id": 2}),
				json!("not an order"),
				json!({"id": "x-3", "store": "C", "amount": "12"}),
			],
			"test",
		);

		assert_eq!(orders.len(), 2);
		assert_eq!(orders[0].id, OrderId::from(1));
		assert_eq!(orders[1].amount, "12");
	}

	#[tokio::test]
	async fn test_load_registry() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("registry.json");
		std::fs::write(
			&path,
			json!({
				"stores": [
					{"name": "A", "hasDeliveryPartner": false},
					{"name": "B", "hasDeliveryPartner": true}
				],
				"partners": [{"name": "swift"}, {"name": "parcel"}]
			})
			.to_string(),
		)
		.unwrap();

		let service = DiscoveryService::new(vec![], &path);
		let registry = service.load_registry().await.unwrap();
		assert!(registry.store_has_delivery_partner("B"));
		assert!(!registry.store_has_delivery_partner("A"));
		assert_eq!(registry.partners.len(), 2);
	}

	#[tokio::test]
	async fn test_missing_registry_is_an_error() {
		let dir = TempDir::new().unwrap();
		let result = load_registry(&dir.path().join("absent.json")).await;
		assert!(matches!(result, Err(DiscoveryError::Io(_))));
	}
}
