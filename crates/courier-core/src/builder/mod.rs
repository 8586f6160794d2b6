//! Builder for constructing dispatch engines.
//!
//! Composes a [`DispatchEngine`] from the storage, order source and partner
//! gateway implementations named in the configuration, using factory
//! functions keyed by implementation name. The optional intake audit database
//! is opened here as well.

use crate::engine::DispatchEngine;
use courier_config::Config;
use courier_delivery::{DeliveryError, DeliveryService, PartnerInterface};
use courier_discovery::{DiscoveryError, DiscoveryService, OrderSourceInterface};
use courier_storage::audit::OrderAuditLog;
use courier_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every component the engine needs.
pub struct DispatchFactories<SF, DIF, DF> {
	pub storage_factories: HashMap<String, SF>,
	pub discovery_factories: HashMap<String, DIF>,
	pub delivery_factories: HashMap<String, DF>,
}

/// Builder for a [`DispatchEngine`] with pluggable implementations.
pub struct DispatchBuilder {
	config: Config,
}

impl DispatchBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine, creating each configured implementation.
	///
	/// Configured implementations without a registered factory are skipped.
	/// Any factory failure aborts the build, as does an unreachable audit
	/// database.
	pub async fn build<SF, DIF, DF>(
		self,
		factories: DispatchFactories<SF, DIF, DF>,
	) -> Result<DispatchEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		DIF: Fn(&toml::Value) -> Result<Box<dyn OrderSourceInterface>, DiscoveryError>,
		DF: Fn(&toml::Value) -> Result<Box<dyn PartnerInterface>, DeliveryError>,
	{
		// Storage
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary storage '{}' failed to load or has no registered implementation",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// Order sources, kept in a stable order so batches concatenate predictably
		let mut source_names: Vec<&String> = self.config.discovery.implementations.keys().collect();
		source_names.sort();

		let mut sources = Vec::new();
		for name in source_names {
			let config = &self.config.discovery.implementations[name];
			if let Some(factory) = factories.discovery_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						sources.push((name.clone(), implementation));
						tracing::info!(component = "discovery", implementation = %name, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "discovery",
							implementation = %name,
							error = %e,
							"Failed to create order source"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create order source '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		if sources.is_empty() {
			return Err(BuilderError::MissingComponent(
				"No valid order sources available".into(),
			));
		}
		let discovery = Arc::new(DiscoveryService::new(
			sources,
			&self.config.discovery.registry_path,
		));

		// Partner gateway
		let mut gateway_impls = HashMap::new();
		for (name, config) in &self.config.delivery.implementations {
			if let Some(factory) = factories.delivery_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						gateway_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.delivery.primary == name;
						tracing::info!(component = "delivery", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "delivery",
							implementation = %name,
							error = %e,
							"Failed to create partner gateway"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create partner gateway '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		let primary_delivery = &self.config.delivery.primary;
		let gateway = gateway_impls.remove(primary_delivery).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary delivery '{}' failed to load or has no registered implementation",
				primary_delivery
			))
		})?;
		let delivery = Arc::new(DeliveryService::new(
			gateway,
			Duration::from_secs(self.config.delivery.request_timeout_seconds),
		));

		// Intake audit
		let audit = match &self.config.intake.audit_database_url {
			Some(url) => {
				let audit = OrderAuditLog::connect(url).await.map_err(|e| {
					tracing::error!(component = "audit", error = %e, "Failed to open audit database");
					BuilderError::Config(format!("Failed to open audit database '{}': {}", url, e))
				})?;
				Some(Arc::new(audit))
			},
			None => None,
		};

		let engine = DispatchEngine::new(self.config, storage, discovery, delivery);
		Ok(match audit {
			Some(audit) => engine.with_order_audit(audit),
			None => engine,
		})
	}
}
