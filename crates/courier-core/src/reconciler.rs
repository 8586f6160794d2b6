//! Reconciler.
//!
//! Periodically sweeps the tracking ledger and writes terminal statuses back
//! onto the order collection. A pass holds the order collection for its whole
//! read-modify-write and persists at most once.

use crate::state::OrderStateMachine;
use courier_storage::StorageService;
use courier_types::{
	current_timestamp, seconds_since, Order, OrderId, OrderStatus, StorageKey, TrackingEntry,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
	/// Tracking entries examined.
	pub scanned: usize,
	/// Orders moved to `Completed`.
	pub completed: usize,
	/// Orders moved to `Failed` after the tracking timeout.
	pub failed: usize,
	/// Entries whose order is not in the collection.
	pub orphaned: usize,
	/// Entries that caused no change.
	pub unchanged: usize,
}

impl ReconcileReport {
	/// Whether the pass changed any order.
	pub fn is_dirty(&self) -> bool {
		self.completed + self.failed > 0
	}
}

/// Applies the ledger to the orders in memory and reports what changed.
///
/// An entry whose details are all complete moves a non-terminal order to
/// `Completed`. With a `tracking_timeout`, an incomplete entry older than the
/// timeout moves a `Placed` order to `Failed`; entries without a recording
/// time never time out. Terminal orders are never touched.
pub fn reconcile_orders(
	orders: &mut [Order],
	entries: &[TrackingEntry],
	now: u64,
	tracking_timeout: Option<Duration>,
) -> ReconcileReport {
	let index: HashMap<OrderId, usize> = orders
		.iter()
		.enumerate()
		.rev()
		.map(|(i, order)| (order.id.clone(), i))
		.collect();

	let mut report = ReconcileReport::default();
	for entry in entries {
		report.scanned += 1;

		let Some(&position) = index.get(&entry.order_id) else {
			tracing::warn!(order_id = %entry.order_id, "Tracking entry has no matching order");
			report.orphaned += 1;
			continue;
		};
		let order = &mut orders[position];

		let target = if entry.is_complete() {
			Some(OrderStatus::Completed)
		} else if order.status == OrderStatus::Placed && is_stale(entry, now, tracking_timeout) {
			Some(OrderStatus::Failed)
		} else {
			None
		};

		match target {
			Some(status) if !order.status.is_terminal() => {
				match OrderStateMachine::apply_transition(order, status) {
					Ok(()) => {
						tracing::info!(order_id = %order.id, status = %status, "Order reconciled");
						if status == OrderStatus::Completed {
							report.completed += 1;
						} else {
							report.failed += 1;
						}
					},
					Err(e) => {
						tracing::warn!(order_id = %order.id, error = %e, "Skipping reconciliation");
						report.unchanged += 1;
					},
				}
			},
			_ => report.unchanged += 1,
		}
	}

	report
}

fn is_stale(entry: &TrackingEntry, now: u64, tracking_timeout: Option<Duration>) -> bool {
	match tracking_timeout {
		Some(timeout) if entry.recorded_at > 0 => {
			seconds_since(entry.recorded_at, now) > timeout.as_secs()
		},
		_ => false,
	}
}

/// Runs reconciliation passes against the persisted collections.
pub struct Reconciler {
	storage: Arc<StorageService>,
	tracking_timeout: Option<Duration>,
}

impl Reconciler {
	pub fn new(storage: Arc<StorageService>, tracking_timeout: Option<Duration>) -> Self {
		Self {
			storage,
			tracking_timeout,
		}
	}

	/// Runs one pass. The order collection is written only if an order changed.
	pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
		let txn = self.storage.begin(StorageKey::Orders).await;
		let entries: Vec<TrackingEntry> = self
			.storage
			.load_collection(StorageKey::Tracking)
			.await
			.map_err(|e| ReconcileError::Storage(e.to_string()))?;
		if entries.is_empty() {
			return Ok(ReconcileReport::default());
		}

		let mut orders: Vec<Order> = txn
			.load()
			.await
			.map_err(|e| ReconcileError::Storage(e.to_string()))?;

		let report = reconcile_orders(
			&mut orders,
			&entries,
			current_timestamp(),
			self.tracking_timeout,
		);

		if report.is_dirty() {
			txn.commit(&orders)
				.await
				.map_err(|e| ReconcileError::Storage(e.to_string()))?;
		}

		Ok(report)
	}
}
