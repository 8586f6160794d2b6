//! Order intake.
//!
//! Merges a freshly fetched batch into the persisted order collection. An
//! order is accepted when its id is not already known and its store does not
//! deliver through a partner of its own. Accepted orders are appended in
//! batch order; existing entries are never reordered or modified. When an
//! audit log is attached, accepted orders are also written to it after the
//! collection commit.

use courier_storage::audit::OrderAuditLog;
use courier_storage::StorageService;
use courier_types::{Order, OrderId, PartnerRegistry, StorageKey};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during intake.
#[derive(Debug, Error)]
pub enum IntakeError {
	/// The order collection could not be read or written.
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Selects the orders of `batch` that intake accepts.
///
/// Duplicate ids inside the batch are accepted once, at their first
/// occurrence.
pub fn select_new_orders(
	batch: Vec<Order>,
	existing: &[Order],
	registry: &PartnerRegistry,
) -> Vec<Order> {
	let mut seen: HashSet<OrderId> = existing.iter().map(|o| o.id.clone()).collect();

	batch
		.into_iter()
		.filter(|order| {
			if registry.store_has_delivery_partner(&order.store) {
				tracing::trace!(order_id = %order.id, store = %order.store, "Store has its own delivery partner");
				return false;
			}
			seen.insert(order.id.clone())
		})
		.collect()
}

/// Handler appending newly observed orders to the order collection.
pub struct IntakeHandler {
	storage: Arc<StorageService>,
	audit: Option<Arc<OrderAuditLog>>,
}

impl IntakeHandler {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			audit: None,
		}
	}

	/// Attaches an audit log receiving every accepted order.
	pub fn with_audit(mut self, audit: Arc<OrderAuditLog>) -> Self {
		self.audit = Some(audit);
		self
	}

	/// Ingests a batch and returns the accepted orders.
	///
	/// A missing collection counts as empty. An unreadable collection aborts
	/// intake without writing anything. Nothing is written when no order is
	/// accepted. Audit failures are logged and never fail intake.
	#[instrument(skip_all, fields(batch = batch.len()))]
	pub async fn ingest(
		&self,
		batch: Vec<Order>,
		registry: &PartnerRegistry,
	) -> Result<Vec<Order>, IntakeError> {
		let txn = self.storage.begin(StorageKey::Orders).await;
		let mut orders: Vec<Order> = txn
			.load()
			.await
			.map_err(|e| IntakeError::Storage(e.to_string()))?;

		let accepted = select_new_orders(batch, &orders, registry);
		if accepted.is_empty() {
			tracing::debug!("No new orders");
			return Ok(accepted);
		}

		orders.extend(accepted.iter().cloned());
		txn.commit(&orders)
			.await
			.map_err(|e| IntakeError::Storage(e.to_string()))?;

		tracing::info!(accepted = accepted.len(), total = orders.len(), "Orders ingested");

		if let Some(audit) = &self.audit {
			let recorded = audit.record(&accepted).await;
			if recorded < accepted.len() {
				tracing::warn!(
					recorded,
					accepted = accepted.len(),
					"Some ingested orders are missing from the audit log"
				);
			}
		}

		Ok(accepted)
	}
}
