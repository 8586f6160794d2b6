//! Per-cycle context.
//!
//! The partner registry is re-read at the start of every pipeline cycle and
//! shared by all stages of that cycle, so a registry edit is picked up by the
//! next cycle without a restart.

use courier_discovery::{DiscoveryError, DiscoveryService};
use courier_types::{Order, Partner, PartnerRegistry};

/// Snapshot of the inputs one cycle works against.
#[derive(Debug, Clone)]
pub struct CycleContext {
	/// Registry as read when the cycle started.
	pub registry: PartnerRegistry,
}

impl CycleContext {
	/// Builds the context by reading the registry through discovery.
	pub async fn load(discovery: &DiscoveryService) -> Result<Self, DiscoveryError> {
		let registry = discovery.load_registry().await?;
		tracing::debug!(
			stores = registry.stores.len(),
			partners = registry.partners.len(),
			"Loaded partner registry"
		);
		Ok(Self { registry })
	}

	/// Partners resolved against `order`, in registry order.
	pub fn partners_for(&self, order: &Order) -> Vec<Partner> {
		self.registry.partners_for(order)
	}

	/// The partner an order was placed with, if it is still registered.
	pub fn placed_partner(&self, order: &Order) -> Option<Partner> {
		order
			.partner
			.as_deref()
			.and_then(|name| self.registry.partner_named(name, order))
	}

	pub fn has_partners(&self) -> bool {
		!self.registry.partners.is_empty()
	}
}
