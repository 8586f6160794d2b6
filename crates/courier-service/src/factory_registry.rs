//! Factory registry for dispatch implementations.
//!
//! Collects the factory functions every component crate registers and turns
//! the implementation names found in the configuration into the factory maps
//! the engine builder consumes.

use courier_config::Config;
use courier_core::{DispatchBuilder, DispatchEngine, DispatchFactories};
use courier_delivery::DeliveryFactory;
use courier_discovery::DiscoveryFactory;
use courier_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Registry of every known implementation factory.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub discovery: HashMap<String, DiscoveryFactory>,
	pub delivery: HashMap<String, DeliveryFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			discovery: HashMap::new(),
			delivery: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_discovery(&mut self, name: impl Into<String>, factory: DiscoveryFactory) {
		self.discovery.insert(name.into(), factory);
	}

	pub fn register_delivery(&mut self, name: impl Into<String>, factory: DeliveryFactory) {
		self.delivery.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the global registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in courier_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in courier_discovery::get_all_implementations() {
			tracing::debug!("Registering order source implementation: {}", name);
			registry.register_discovery(name, factory);
		}

		for (name, factory) in courier_delivery::get_all_implementations() {
			tracing::debug!("Registering delivery implementation: {}", name);
			registry.register_delivery(name, factory);
		}

		registry
	})
}

/// Selects the factories for the implementations named in the config.
///
/// Unknown names are an error listing what is available.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Builds the dispatch engine from the registry and configuration.
pub async fn build_engine_from_config(
	config: Config,
) -> Result<DispatchEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let discovery_factories = build_factories!(
		registry,
		config.discovery.implementations,
		discovery,
		"discovery"
	);
	let delivery_factories = build_factories!(
		registry,
		config.delivery.implementations,
		delivery,
		"delivery"
	);

	let factories = DispatchFactories {
		storage_factories,
		discovery_factories,
		delivery_factories,
	};

	Ok(DispatchBuilder::new(config).build(factories).await?)
}
