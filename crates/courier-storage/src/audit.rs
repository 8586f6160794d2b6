//! SQLite audit log of ingested orders.
//!
//! Every order intake accepts is also inserted into an `Orders_details`
//! table once the order collection has been committed. The JSON collection
//! stays authoritative; the table is an append-only record for reporting.

use crate::StorageError;
use courier_types::Order;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS Orders_details (
	id TEXT PRIMARY KEY NOT NULL,
	customer_name TEXT,
	store TEXT,
	amount TEXT,
	status TEXT,
	created_at DATETIME DEFAULT CURRENT_TIMESTAMP
)";

const INSERT_ORDER: &str =
	"INSERT INTO Orders_details (id, customer_name, store, amount, status) VALUES (?, ?, ?, ?, ?)";

/// Audit table writer backed by a SQLite pool.
pub struct OrderAuditLog {
	pool: SqlitePool,
}

impl OrderAuditLog {
	/// Opens (creating if needed) the database at `url` and ensures the table.
	///
	/// `url` is a sqlx SQLite URL such as `sqlite://data/orders.sqlite` or
	/// `sqlite::memory:`. An in-memory database lives as long as the log.
	pub async fn connect(url: &str) -> Result<Self, StorageError> {
		if !url.starts_with("sqlite:") {
			return Err(StorageError::Configuration(format!(
				"Audit database URL '{}' must start with sqlite:",
				url
			)));
		}

		let options = SqliteConnectOptions::from_str(url)
			.map_err(|e| StorageError::Configuration(format!("Invalid audit database URL: {}", e)))?
			.create_if_missing(true);

		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.idle_timeout(None)
			.max_lifetime(None)
			.connect_with(options)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		sqlx::query(CREATE_TABLE)
			.execute(&pool)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		tracing::info!(component = "storage", database = %url, "Order audit log ready");
		Ok(Self { pool })
	}

	/// Inserts one row per order and returns how many were written.
	///
	/// A failing insert is logged and skipped; the remaining orders are still
	/// written.
	pub async fn record(&self, orders: &[Order]) -> usize {
		let mut inserted = 0;
		for order in orders {
			let result = sqlx::query(INSERT_ORDER)
				.bind(order.id.to_string())
				.bind(customer_name(order))
				.bind(order.store.as_str())
				.bind(order.amount.as_str())
				.bind(order.status.to_string())
				.execute(&self.pool)
				.await;

			match result {
				Ok(_) => inserted += 1,
				Err(e) => {
					tracing::warn!(order_id = %order.id, error = %e, "Failed to insert order into audit log");
				},
			}
		}
		inserted
	}

	/// The underlying pool.
	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

/// Customer payload as stored in the table: plain strings as-is, anything
/// else as its JSON text.
fn customer_name(order: &Order) -> Option<String> {
	match &order.customer {
		serde_json::Value::Null => None,
		serde_json::Value::String(name) => Some(name.clone()),
		other => Some(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use tempfile::TempDir;

	type Row = (String, Option<String>, String, String, String);

	async fn rows(log: &OrderAuditLog) -> Vec<Row> {
		sqlx::query_as::<_, Row>(
			"SELECT id, customer_name, store, amount, status FROM Orders_details ORDER BY id",
		)
		.fetch_all(log.pool())
		.await
		.unwrap()
	}

	#[tokio::test]
	async fn test_records_orders() {
		let log = OrderAuditLog::connect("sqlite::memory:").await.unwrap();
		let mut first = Order::new(1, "A");
		first.customer = json!("Ada");
		first.amount = "24.5".to_string();
		let mut second = Order::new("x-2", "A");
		second.customer = json!({"name": "Grace"});

		assert_eq!(log.record(&[first, second]).await, 2);

		let rows = rows(&log).await;
		assert_eq!(rows.len(), 2);
		assert_eq!(
			rows[0],
			(
				"1".to_string(),
				Some("Ada".to_string()),
				"A".to_string(),
				"24.5".to_string(),
				"Pending".to_string()
			)
		);
		assert_eq!(rows[1].0, "x-2");
		assert_eq!(rows[1].1.as_deref(), Some(r#"{"name":"Grace"}"#));
	}

	#[tokio::test]
	async fn test_duplicate_insert_is_skipped() {
		let log = OrderAuditLog::connect("sqlite::memory:").await.unwrap();

		assert_eq!(log.record(&[Order::new(1, "A")]).await, 1);
		assert_eq!(
			log.record(&[Order::new(1, "A"), Order::new(2, "A")]).await,
			1
		);
		assert_eq!(rows(&log).await.len(), 2);
	}

	#[tokio::test]
	async fn test_file_database_is_created() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("orders.sqlite");
		let url = format!("sqlite://{}", path.to_string_lossy());

		let log = OrderAuditLog::connect(&url).await.unwrap();
		log.record(&[Order::new(5, "A")]).await;

		assert!(path.exists());
		assert_eq!(rows(&log).await.len(), 1);
	}

	#[tokio::test]
	async fn test_invalid_url_is_rejected() {
		assert!(matches!(
			OrderAuditLog::connect("postgres://localhost/orders").await,
			Err(StorageError::Configuration(_))
		));
	}
}
