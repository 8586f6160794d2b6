//! Order types for the courier dispatch system.
//!
//! This module defines the persisted order record, its identifier and the
//! lifecycle status that the placement and reconciliation stages advance.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of an order as reported by the store collector.
///
/// Stores emit either numeric or string identifiers, so both are accepted
/// and preserved verbatim when the order is persisted again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderId {
	/// Numeric identifier, e.g. `1`.
	Numeric(u64),
	/// Free-form string identifier.
	Text(String),
}

impl fmt::Display for OrderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderId::Numeric(id) => write!(f, "{}", id),
			OrderId::Text(id) => write!(f, "{}", id),
		}
	}
}

impl From<u64> for OrderId {
	fn from(id: u64) -> Self {
		OrderId::Numeric(id)
	}
}

impl From<&str> for OrderId {
	fn from(id: &str) -> Self {
		OrderId::Text(id.to_string())
	}
}

/// A customer delivery request with a lifecycle status.
///
/// The JSON shape matches the order collection file: camelCase keys, the
/// store-provided endpoint URLs and opaque pickup/drop location payloads.
/// Fields that are absent from raw store records fall back to defaults so
/// that a partially filled record can still be ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Unique, stable identifier.
	pub id: OrderId,
	/// Customer name or payload as provided by the store.
	#[serde(default)]
	pub customer: serde_json::Value,
	/// Name of the store the order originates from.
	pub store: String,
	/// Order amount, kept in its textual form.
	#[serde(default, deserialize_with = "deserialize_amount")]
	pub amount: String,
	/// Current lifecycle status.
	#[serde(default)]
	pub status: OrderStatus,
	/// Order endpoint advertised by the store.
	#[serde(default)]
	pub order_url: String,
	/// Quote endpoint advertised by the store.
	#[serde(default)]
	pub quote_url: String,
	/// Status endpoint advertised by the store.
	#[serde(default)]
	pub status_url: String,
	/// Pickup location payload.
	#[serde(default)]
	pub pickup: serde_json::Value,
	/// Drop location payload.
	#[serde(default)]
	pub drop: serde_json::Value,
	/// Partner the order was placed with.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub partner: Option<String>,
	/// Delivery URL returned by the partner on acceptance.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delivery_url: Option<String>,
}

impl Order {
	/// Creates a pending order with empty endpoints and locations.
	pub fn new(id: impl Into<OrderId>, store: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			customer: serde_json::Value::Null,
			store: store.into(),
			amount: String::new(),
			status: OrderStatus::Pending,
			order_url: String::new(),
			quote_url: String::new(),
			status_url: String::new(),
			pickup: serde_json::Value::Null,
			drop: serde_json::Value::Null,
			partner: None,
			delivery_url: None,
		}
	}
}

/// Accepts amounts written either as JSON numbers or strings.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	match serde_json::Value::deserialize(deserializer)? {
		serde_json::Value::String(s) => Ok(s),
		serde_json::Value::Number(n) => Ok(n.to_string()),
		serde_json::Value::Null => Ok(String::new()),
		other => Err(de::Error::custom(format!(
			"amount must be a string or number, got {}",
			other
		))),
	}
}

/// Status of an order in the dispatch lifecycle.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
	/// Order has been ingested but not yet accepted by a partner.
	#[default]
	#[serde(alias = "pending")]
	Pending,
	/// A partner accepted the order.
	#[serde(alias = "placed")]
	Placed,
	/// Every tracking event reported completion.
	#[serde(alias = "completed")]
	Completed,
	/// Delivery did not complete.
	#[serde(alias = "failed")]
	Failed,
}

impl OrderStatus {
	/// Returns true for statuses that are never left again.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Completed | OrderStatus::Failed)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Pending => write!(f, "Pending"),
			OrderStatus::Placed => write!(f, "Placed"),
			OrderStatus::Completed => write!(f, "Completed"),
			OrderStatus::Failed => write!(f, "Failed"),
		}
	}
}
