//! Tracking ledger.
//!
//! Holds at most one [`TrackingEntry`] per order id. Entries are written once
//! and never changed afterwards; the reconciler only reads them.

use courier_storage::StorageService;
use courier_types::{current_timestamp, OrderId, StorageKey, TrackingDetail, TrackingEntry};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while reading or appending to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Append-only tracking ledger backed by the tracking collection.
pub struct TrackingLedger {
	storage: Arc<StorageService>,
}

impl TrackingLedger {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Appends a tracking entry for an order.
	///
	/// Returns `false` without writing when the order already has an entry.
	/// Otherwise the entry is persisted before `true` is returned.
	pub async fn append(
		&self,
		order_id: OrderId,
		tracking_details: Vec<TrackingDetail>,
		order_url: String,
	) -> Result<bool, LedgerError> {
		self.record(TrackingEntry {
			order_id,
			tracking_details,
			order_url,
			delivery_url: None,
			recorded_at: current_timestamp(),
		})
		.await
	}

	/// Appends a fully built entry with the same at-most-once rule as [`append`](Self::append).
	pub async fn record(&self, entry: TrackingEntry) -> Result<bool, LedgerError> {
		let txn = self.storage.begin(StorageKey::Tracking).await;
		let mut entries: Vec<TrackingEntry> = txn
			.load()
			.await
			.map_err(|e| LedgerError::Storage(e.to_string()))?;

		if entries.iter().any(|e| e.order_id == entry.order_id) {
			tracing::debug!(order_id = %entry.order_id, "Tracking entry already present, skipping");
			return Ok(false);
		}

		let order_id = entry.order_id.clone();
		entries.push(entry);
		txn.commit(&entries)
			.await
			.map_err(|e| LedgerError::Storage(e.to_string()))?;

		tracing::info!(order_id = %order_id, "Tracking entry recorded");
		Ok(true)
	}

	/// Reads every entry in append order.
	pub async fn entries(&self) -> Result<Vec<TrackingEntry>, LedgerError> {
		self.storage
			.load_collection(StorageKey::Tracking)
			.await
			.map_err(|e| LedgerError::Storage(e.to_string()))
	}
}
