//! Quote engine.
//!
//! Asks every registered partner for a price and keeps the cheapest. A
//! partner whose quote call fails is left out of the comparison.

use courier_delivery::DeliveryService;
use courier_types::{Order, Partner, Quote};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while quoting an order.
#[derive(Debug, Error)]
pub enum QuoteError {
	/// The registry lists no partners at all.
	#[error("No delivery partners registered")]
	NoPartners,
	/// Every partner failed to quote the order.
	#[error("No partner returned a quote for order {0}")]
	NoQuotes(String),
}

/// Picks the quote with the strictly lowest price.
///
/// On a tie the earliest quote wins, so with quotes in registry order the
/// first registered partner is preferred.
pub fn select_cheapest(quotes: Vec<Quote>) -> Option<Quote> {
	quotes.into_iter().fold(None, |best, quote| match best {
		Some(current) if current.price <= quote.price => Some(current),
		_ => Some(quote),
	})
}

/// Handler collecting partner quotes for an order.
pub struct QuoteHandler {
	delivery: Arc<DeliveryService>,
}

impl QuoteHandler {
	pub fn new(delivery: Arc<DeliveryService>) -> Self {
		Self { delivery }
	}

	/// Requests quotes from all partners and returns the cheapest.
	#[instrument(skip_all, fields(order_id = %order.id))]
	pub async fn best_quote(&self, order: &Order, partners: &[Partner]) -> Result<Quote, QuoteError> {
		if partners.is_empty() {
			return Err(QuoteError::NoPartners);
		}

		let results = join_all(
			partners
				.iter()
				.map(|partner| self.delivery.quote(partner, order)),
		)
		.await;

		let quotes: Vec<Quote> = partners
			.iter()
			.zip(results)
			.filter_map(|(partner, result)| match result {
				Ok(price) => {
					tracing::debug!(partner = %partner.name, price = %price, "Quote received");
					Some(Quote::from_partner(partner, price))
				},
				Err(e) => {
					tracing::warn!(partner = %partner.name, error = %e, "Quote request failed");
					None
				},
			})
			.collect();

		let best = select_cheapest(quotes).ok_or_else(|| QuoteError::NoQuotes(order.id.to_string()))?;
		tracing::info!(partner = %best.partner_name, price = %best.price, "Selected cheapest partner");
		Ok(best)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use courier_delivery::{DeliveryError, MockPartnerInterface};
	use courier_types::PartnerEntry;
	use rust_decimal::Decimal;
	use std::time::Duration;

	fn partners(order: &Order, names: &[&str]) -> Vec<Partner> {
		names
			.iter()
			.map(|name| Partner::resolve(&PartnerEntry::named(*name), order))
			.collect()
	}

	fn quote(name: &str, price: i64) -> Quote {
		Quote {
			partner_name: name.to_string(),
			price: Decimal::from(price),
			order_endpoint: String::new(),
			status_endpoint: String::new(),
		}
	}

	fn handler(prices: &'static [(&'static str, Option<i64>)]) -> QuoteHandler {
		let mut gateway = MockPartnerInterface::new();
		gateway.expect_quote().returning(move |partner, _| {
			match prices.iter().find(|(name, _)| *name == partner.name) {
				Some((_, Some(price))) => Ok(Decimal::from(*price)),
				_ => Err(DeliveryError::Network("connection refused".to_string())),
			}
		});
		QuoteHandler::new(Arc::new(DeliveryService::new(
			Box::new(gateway),
			Duration::from_secs(5),
		)))
	}

	#[test]
	fn test_select_cheapest() {
		let best = select_cheapest(vec![quote("a", 50), quote("b", 10), quote("c", 30)]).unwrap();
		assert_eq!(best.partner_name, "b");

		let tie = select_cheapest(vec![quote("a", 20), quote("b", 20), quote("c", 25)]).unwrap();
		assert_eq!(tie.partner_name, "a");

		assert!(select_cheapest(vec![]).is_none());
	}

	#[tokio::test]
	async fn test_best_quote_across_partners() {
		let handler = handler(&[("a", Some(50)), ("b", Some(10)), ("c", Some(30))]);
		let order = Order::new(1, "A");

		let best = handler
			.best_quote(&order, &partners(&order, &["a", "b", "c"]))
			.await
			.unwrap();
		assert_eq!(best.partner_name, "b");
		assert_eq!(best.price, Decimal::from(10));
	}

	#[tokio::test]
	async fn test_failed_partner_is_excluded() {
		let handler = handler(&[("a", None), ("b", Some(40))]);
		let order = Order::new(1, "A");

		let best = handler
			.best_quote(&order, &partners(&order, &["a", "b"]))
			.await
			.unwrap();
		assert_eq!(best.partner_name, "b");
	}

	#[tokio::test]
	async fn test_no_quotes_and_no_partners() {
		let handler = handler(&[("a", None)]);
		let order = Order::new(1, "A");

		assert!(matches!(
			handler.best_quote(&order, &partners(&order, &["a"])).await,
			Err(QuoteError::NoQuotes(_))
		));
		assert!(matches!(
			handler.best_quote(&order, &[]).await,
			Err(QuoteError::NoPartners)
		));
	}
}
