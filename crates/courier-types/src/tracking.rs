//! Tracking ledger types.

use crate::OrderId;
use serde::{Deserialize, Serialize};

/// One delivery progress event reported by a partner.
///
/// Only `completed` is interpreted; any other keys the partner sends are
/// kept so the ledger preserves the full snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingDetail {
	#[serde(default)]
	pub completed: bool,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TrackingDetail {
	/// Creates a detail with only the completion flag set.
	pub fn new(completed: bool) -> Self {
		Self {
			completed,
			extra: serde_json::Map::new(),
		}
	}
}

/// A ledger record linking an order to its delivery progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEntry {
	pub order_id: OrderId,
	#[serde(default)]
	pub tracking_details: Vec<TrackingDetail>,
	#[serde(default)]
	pub order_url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delivery_url: Option<String>,
	/// Unix seconds at which the entry was appended; 0 when unknown.
	#[serde(default)]
	pub recorded_at: u64,
}

impl TrackingEntry {
	/// Returns true when every tracking detail reports completion.
	///
	/// An entry without details is vacuously complete.
	pub fn is_complete(&self) -> bool {
		self.tracking_details.iter().all(|detail| detail.completed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_completion_predicate() {
		let entry: TrackingEntry = serde_json::from_value(json!({
			"orderId": 1,
			"trackingDetails": [
				{"completed": true, "stage": "picked_up"},
				{"completed": false, "stage": "delivered"}
			],
			"orderUrl": "http://store/order"
		}))
		.unwrap();
		assert!(!entry.is_complete());
		assert_eq!(entry.recorded_at, 0);
		assert_eq!(entry.tracking_details[0].extra["stage"], "picked_up");

		let done = TrackingEntry {
			tracking_details: vec![TrackingDetail::new(true), TrackingDetail::new(true)],
			..entry
		};
		assert!(done.is_complete());
	}
}
