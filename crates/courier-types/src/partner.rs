//! Partner registry, partner and quote types.
//!
//! The registry is the read-only `{stores, partners}` document maintained
//! outside the dispatcher. It is re-read at the start of every cycle and
//! resolved into [`Partner`] values for the orders processed in that cycle.

use crate::Order;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A store known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreEntry {
	/// Store name as used in order records.
	pub name: String,
	/// Whether the store already delivers through its own partner.
	#[serde(default)]
	pub has_delivery_partner: bool,
}

/// A delivery partner as listed in the registry.
///
/// Endpoints are optional; an order's own URLs are used for the ones that
/// are not listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerEntry {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quote_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub order_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status_url: Option<String>,
}

impl PartnerEntry {
	/// Creates a registry entry with no explicit endpoints.
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			quote_url: None,
			order_url: None,
			status_url: None,
		}
	}
}

/// The partner registry document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRegistry {
	#[serde(default)]
	pub stores: Vec<StoreEntry>,
	#[serde(default)]
	pub partners: Vec<PartnerEntry>,
}

impl PartnerRegistry {
	/// Returns whether the named store already has a delivery partner.
	///
	/// Stores missing from the registry are treated as having none.
	pub fn store_has_delivery_partner(&self, store: &str) -> bool {
		self.stores
			.iter()
			.find(|s| s.name == store)
			.is_some_and(|s| s.has_delivery_partner)
	}

	/// Resolves every registered partner against an order, in registry order.
	pub fn partners_for(&self, order: &Order) -> Vec<Partner> {
		self.partners
			.iter()
			.map(|entry| Partner::resolve(entry, order))
			.collect()
	}

	/// Finds a partner by name and resolves it against an order.
	pub fn partner_named(&self, name: &str, order: &Order) -> Option<Partner> {
		self.partners
			.iter()
			.find(|entry| entry.name == name)
			.map(|entry| Partner::resolve(entry, order))
	}
}

/// A delivery partner with fully resolved endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partner {
	pub name: String,
	pub quote_endpoint: String,
	pub order_endpoint: String,
	pub status_endpoint: String,
}

impl Partner {
	/// Resolves a registry entry, falling back to the order's endpoints.
	pub fn resolve(entry: &PartnerEntry, order: &Order) -> Self {
		Self {
			name: entry.name.clone(),
			quote_endpoint: entry
				.quote_url
				.clone()
				.unwrap_or_else(|| order.quote_url.clone()),
			order_endpoint: entry
				.order_url
				.clone()
				.unwrap_or_else(|| order.order_url.clone()),
			status_endpoint: entry
				.status_url
				.clone()
				.unwrap_or_else(|| order.status_url.clone()),
		}
	}
}

/// A partner's price offer for one order. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
	pub partner_name: String,
	pub price: Decimal,
	pub order_endpoint: String,
	pub status_endpoint: String,
}

impl Quote {
	/// Builds a quote for the given partner at the given price.
	pub fn from_partner(partner: &Partner, price: Decimal) -> Self {
		Self {
			partner_name: partner.name.clone(),
			price,
			order_endpoint: partner.order_endpoint.clone(),
			status_endpoint: partner.status_endpoint.clone(),
		}
	}
}
