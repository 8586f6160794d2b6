//! Dispatch engine that drives the order lifecycle.
//!
//! The engine owns the two periodic drivers: the pipeline cycle (intake,
//! quoting, placement, polling and tracking) and the reconciliation pass.
//! Intake can also be triggered on demand. Triggered intake and pipeline
//! cycles never overlap.

pub mod context;

use crate::handlers::{
	IntakeError, IntakeHandler, PlacementHandler, PlacementOutcome, QuoteHandler, StatusHandler,
	TrackingOutcome,
};
use crate::ledger::TrackingLedger;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::state::OrderStateMachine;
use context::CycleContext;
use courier_config::Config;
use courier_delivery::DeliveryService;
use courier_discovery::DiscoveryService;
use courier_storage::audit::OrderAuditLog;
use courier_storage::StorageService;
use courier_types::{Order, OrderId, OrderStatus, Partner};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
	#[error("Intake error: {0}")]
	Intake(#[from] IntakeError),
}

/// Summary of one pipeline cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
	/// Orders added to the collection.
	pub ingested: usize,
	/// Pending orders moved to Placed.
	pub placed: usize,
	/// Placements the partner declined.
	pub rejected: usize,
	/// Orders whose quoting or placement failed.
	pub failed: usize,
	/// Ledger entries written.
	pub tracked: usize,
}

/// How a single order fared within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderOutcome {
	Failed,
	Rejected,
	Placed { tracked: bool },
	Polled { tracked: bool },
}

impl CycleReport {
	fn record(&mut self, outcome: OrderOutcome) {
		match outcome {
			OrderOutcome::Failed => self.failed += 1,
			OrderOutcome::Rejected => self.rejected += 1,
			OrderOutcome::Placed { tracked } => {
				self.placed += 1;
				self.tracked += usize::from(tracked);
			},
			OrderOutcome::Polled { tracked } => self.tracked += usize::from(tracked),
		}
	}
}

/// Converts the configured tracking timeout, saturating on huge values.
fn tracking_timeout(minutes: Option<u64>) -> Option<Duration> {
	minutes.map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
}

/// Main dispatch engine.
#[derive(Clone)]
pub struct DispatchEngine {
	/// Service configuration.
	pub(crate) config: Config,
	/// Storage service holding the order and tracking collections.
	pub(crate) storage: Arc<StorageService>,
	/// Order sources and partner registry.
	pub(crate) discovery: Arc<DiscoveryService>,
	/// Order state machine
	pub(crate) state_machine: Arc<OrderStateMachine>,
	/// Tracking ledger
	pub(crate) ledger: Arc<TrackingLedger>,
	pub(crate) intake_handler: Arc<IntakeHandler>,
	pub(crate) quote_handler: Arc<QuoteHandler>,
	pub(crate) placement_handler: Arc<PlacementHandler>,
	pub(crate) status_handler: Arc<StatusHandler>,
	pub(crate) reconciler: Arc<Reconciler>,
	/// Serializes pipeline cycles.
	cycle_lock: Arc<Mutex<()>>,
}

impl DispatchEngine {
	/// Creates a new engine with the given services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		discovery: Arc<DiscoveryService>,
		delivery: Arc<DeliveryService>,
	) -> Self {
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));
		let ledger = Arc::new(TrackingLedger::new(storage.clone()));
		let tracking_timeout = tracking_timeout(config.reconciler.tracking_timeout_minutes);

		Self {
			intake_handler: Arc::new(IntakeHandler::new(storage.clone())),
			quote_handler: Arc::new(QuoteHandler::new(delivery.clone())),
			placement_handler: Arc::new(PlacementHandler::new(
				delivery.clone(),
				state_machine.clone(),
			)),
			status_handler: Arc::new(StatusHandler::new(delivery, ledger.clone())),
			reconciler: Arc::new(Reconciler::new(storage.clone(), tracking_timeout)),
			config,
			storage,
			discovery,
			state_machine,
			ledger,
			cycle_lock: Arc::new(Mutex::new(())),
		}
	}

	/// Writes every order accepted by intake to `audit` as well.
	pub fn with_order_audit(mut self, audit: Arc<OrderAuditLog>) -> Self {
		self.intake_handler =
			Arc::new(IntakeHandler::new(self.storage.clone()).with_audit(audit));
		self
	}

	/// Runs both periodic drivers until ctrl-c.
	pub async fn run(&self) -> Result<(), EngineError> {
		let cycle_every = Duration::from_secs(self.config.service.cycle_interval_seconds);
		let reconcile_every = Duration::from_secs(self.config.service.reconcile_interval_seconds);
		if cycle_every.is_zero() || reconcile_every.is_zero() {
			return Err(EngineError::Config(
				"cycle and reconcile intervals must be positive".to_string(),
			));
		}

		let engine = self.clone();
		let pipeline_handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(cycle_every);
			interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
			loop {
				interval.tick().await;
				match engine.run_cycle().await {
					Ok(report) => tracing::info!(?report, "Cycle finished"),
					Err(e) => tracing::warn!(error = %e, "Cycle skipped"),
				}
			}
		});

		let engine = self.clone();
		let reconcile_handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(reconcile_every);
			interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
			loop {
				interval.tick().await;
				if let Err(e) = engine.reconcile_once().await {
					tracing::warn!(error = %e, "Reconciliation skipped");
				}
			}
		});

		tracing::info!(
			cycle_interval = ?cycle_every,
			reconcile_interval = ?reconcile_every,
			"Dispatch engine running"
		);
		let shutdown = tokio::signal::ctrl_c().await;

		pipeline_handle.abort();
		reconcile_handle.abort();
		shutdown.map_err(|e| EngineError::Service(format!("Failed to wait for shutdown: {}", e)))
	}

	/// Runs one pipeline cycle.
	///
	/// Fresh orders are ingested, every Pending order is quoted, placed and
	/// polled, and Placed orders not yet in the ledger are polled again.
	/// Failures on individual orders are logged and counted; they never abort
	/// the cycle.
	pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
		let _cycle = self.cycle_lock.lock().await;
		let mut report = CycleReport::default();

		let context = self.load_context().await?;
		report.ingested = self.ingest(&context).await?;

		if !context.has_partners() {
			tracing::warn!("No delivery partners registered, skipping dispatch");
			return Ok(report);
		}

		let orders = self
			.state_machine
			.orders()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		let tracked: HashSet<OrderId> = self
			.ledger
			.entries()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?
			.into_iter()
			.map(|entry| entry.order_id)
			.collect();

		let (pending, awaiting): (Vec<Order>, Vec<Order>) = orders
			.into_iter()
			.filter(|order| match order.status {
				OrderStatus::Pending => true,
				OrderStatus::Placed => !tracked.contains(&order.id),
				_ => false,
			})
			.partition(|order| order.status == OrderStatus::Pending);

		let limit = self.config.service.max_concurrent_orders.max(1);
		let outcomes: Vec<OrderOutcome> = stream::iter(
			pending
				.iter()
				.map(|order| self.dispatch_order(order, &context))
				.collect::<Vec<_>>(),
		)
		.buffer_unordered(limit)
		.collect()
		.await;
		outcomes.into_iter().for_each(|o| report.record(o));

		let outcomes: Vec<OrderOutcome> = stream::iter(
			awaiting
				.iter()
				.map(|order| self.resume_order(order, &context))
				.collect::<Vec<_>>(),
		)
		.buffer_unordered(limit)
		.collect()
		.await;
		outcomes.into_iter().for_each(|o| report.record(o));

		Ok(report)
	}

	/// Runs intake only and returns how many orders were accepted.
	///
	/// Nothing is quoted, placed or polled; the next pipeline cycle picks the
	/// new orders up.
	pub async fn ingest_once(&self) -> Result<usize, EngineError> {
		let _cycle = self.cycle_lock.lock().await;
		let context = self.load_context().await?;
		self.ingest(&context).await
	}

	/// Runs one reconciliation pass.
	pub async fn reconcile_once(&self) -> Result<ReconcileReport, EngineError> {
		let report = self
			.reconciler
			.reconcile()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		if report.is_dirty() || report.orphaned > 0 {
			tracing::info!(?report, "Reconciliation finished");
		}
		Ok(report)
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	async fn load_context(&self) -> Result<CycleContext, EngineError> {
		CycleContext::load(&self.discovery)
			.await
			.map_err(|e| EngineError::Service(format!("Failed to load partner registry: {}", e)))
	}

	async fn ingest(&self, context: &CycleContext) -> Result<usize, EngineError> {
		let batch = self.discovery.fetch_all().await;
		Ok(self.intake_handler.ingest(batch, &context.registry).await?.len())
	}

	/// Quotes, places and polls one Pending order.
	async fn dispatch_order(&self, order: &Order, context: &CycleContext) -> OrderOutcome {
		let partners = context.partners_for(order);
		let quote = match self.quote_handler.best_quote(order, &partners).await {
			Ok(quote) => quote,
			Err(e) => {
				tracing::warn!(order_id = %order.id, error = %e, "Quoting failed, order stays pending");
				return OrderOutcome::Failed;
			},
		};
		let Some(partner) = partners.into_iter().find(|p| p.name == quote.partner_name) else {
			return OrderOutcome::Failed;
		};

		let placed = match self.placement_handler.place(order, &partner).await {
			Ok(PlacementOutcome::Placed { order, .. }) => order,
			Ok(PlacementOutcome::Rejected) => return OrderOutcome::Rejected,
			Err(e) => {
				tracing::warn!(order_id = %order.id, error = %e, "Placement failed, order stays pending");
				return OrderOutcome::Failed;
			},
		};

		let delay = Duration::from_millis(self.config.service.status_poll_delay_ms);
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		OrderOutcome::Placed {
			tracked: self.poll_order(&placed, &partner).await,
		}
	}

	/// Polls a Placed order that has no ledger entry yet.
	async fn resume_order(&self, order: &Order, context: &CycleContext) -> OrderOutcome {
		match context.placed_partner(order) {
			Some(partner) => OrderOutcome::Polled {
				tracked: self.poll_order(order, &partner).await,
			},
			None => {
				tracing::warn!(
					order_id = %order.id,
					partner = ?order.partner,
					"Placed order's partner is not registered, cannot poll"
				);
				OrderOutcome::Polled { tracked: false }
			},
		}
	}

	async fn poll_order(&self, order: &Order, partner: &Partner) -> bool {
		match self.status_handler.track(order, partner).await {
			Ok(TrackingOutcome::Recorded) => true,
			Ok(TrackingOutcome::AlreadyTracked) | Ok(TrackingOutcome::NotDelivered(_)) => false,
			Err(e) => {
				tracing::warn!(order_id = %order.id, error = %e, "Status polling failed");
				false
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use courier_delivery::implementations::simulated::create_gateway;
	use courier_discovery::implementations::file::create_discovery;
	use courier_discovery::OrderSourceInterface;
	use courier_storage::implementations::memory::MemoryStorage;
	use courier_types::{StorageKey, TrackingEntry};
	use std::path::Path;
	use tempfile::TempDir;

	const REGISTRY: &str = r#"{
		"stores": [
			{"name": "A", "hasDeliveryPartner": false},
			{"name": "B", "hasDeliveryPartner": true}
		],
		"partners": [{"name": "swift"}, {"name": "rapid"}]
	}"#;

	const ORDERS: &str = r#"[
		{"id": 1, "store": "A", "amount": 25, "orderUrl": "http://a/order", "statusUrl": "http://a/status"},
		{"id": 2, "store": "B", "amount": "12.50"}
	]"#;

	fn config(dir: &Path, delivery: &str) -> Config {
		format!(
			r#"
[service]
id = "test-dispatcher"
status_poll_delay_ms = 0

[storage]
primary = "memory"
[storage.implementations.memory]

[discovery]
registry_path = {registry:?}
[discovery.implementations.file]
path = {orders:?}

[delivery]
primary = "simulated"
[delivery.implementations.simulated]
{delivery}
"#,
			registry = dir.join("registry.json").to_string_lossy(),
			orders = dir.join("orders.json").to_string_lossy(),
		)
		.parse()
		.unwrap()
	}

	fn engine(dir: &TempDir, delivery: &str) -> DispatchEngine {
		std::fs::write(dir.path().join("registry.json"), REGISTRY).unwrap();
		std::fs::write(dir.path().join("orders.json"), ORDERS).unwrap();
		let config = config(dir.path(), delivery);

		let source_config = &config.discovery.implementations["file"];
		let sources: Vec<(String, Box<dyn OrderSourceInterface>)> =
			vec![("file".to_string(), create_discovery(source_config).unwrap())];
		let discovery = Arc::new(DiscoveryService::new(
			sources,
			&config.discovery.registry_path,
		));
		let gateway = create_gateway(&config.delivery.implementations["simulated"]).unwrap();
		let delivery = Arc::new(DeliveryService::new(gateway, Duration::from_secs(5)));
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));

		DispatchEngine::new(config, storage, discovery, delivery)
	}

	async fn order_1(engine: &DispatchEngine) -> Order {
		engine
			.state_machine
			.get_order(&OrderId::from(1))
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_order_is_dispatched_and_completed() {
		let dir = TempDir::new().unwrap();
		let engine = engine(&dir, "");

		let report = engine.run_cycle().await.unwrap();
		assert_eq!(report.ingested, 1);
		assert_eq!(report.placed, 1);
		assert_eq!(report.tracked, 1);

		let placed = order_1(&engine).await;
		assert_eq!(placed.status, OrderStatus::Placed);
		assert_eq!(
			placed.delivery_url.as_deref(),
			Some("https://mock.delivery.url/1")
		);

		let entries: Vec<TrackingEntry> = engine
			.storage()
			.load_collection(StorageKey::Tracking)
			.await
			.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].order_url, "http://a/order");

		let reconciled = engine.reconcile_once().await.unwrap();
		assert_eq!(reconciled.completed, 1);
		assert_eq!(order_1(&engine).await.status, OrderStatus::Completed);
	}

	#[tokio::test]
	async fn test_store_with_partner_is_never_added() {
		let dir = TempDir::new().unwrap();
		let engine = engine(&dir, "");

		engine.run_cycle().await.unwrap();
		engine.run_cycle().await.unwrap();

		let orders = engine.state_machine.orders().await.unwrap();
		assert_eq!(orders.len(), 1);
		assert_eq!(orders[0].id, OrderId::from(1));
	}

	#[tokio::test]
	async fn test_declined_placement_is_retried() {
		let dir = TempDir::new().unwrap();
		let engine = engine(&dir, "placement_success = false");

		let report = engine.run_cycle().await.unwrap();
		assert_eq!(report.rejected, 1);
		assert_eq!(order_1(&engine).await.status, OrderStatus::Pending);

		let report = engine.run_cycle().await.unwrap();
		assert_eq!(report.ingested, 0);
		assert_eq!(report.rejected, 1);
	}

	#[tokio::test]
	async fn test_undelivered_order_is_polled_again() {
		let dir = TempDir::new().unwrap();
		let engine = engine(&dir, r#"status = "in_transit""#);

		let report = engine.run_cycle().await.unwrap();
		assert_eq!(report.placed, 1);
		assert_eq!(report.tracked, 0);

		let report = engine.run_cycle().await.unwrap();
		assert_eq!(report.placed, 0);
		assert_eq!(report.tracked, 0);
		assert_eq!(order_1(&engine).await.status, OrderStatus::Placed);
		assert_eq!(engine.reconcile_once().await.unwrap().scanned, 0);
	}

	#[tokio::test]
	async fn test_ingest_once_does_not_dispatch() {
		let dir = TempDir::new().unwrap();
		let engine = engine(&dir, "");

		assert_eq!(engine.ingest_once().await.unwrap(), 1);
		assert_eq!(engine.ingest_once().await.unwrap(), 0);

		let order = order_1(&engine).await;
		assert_eq!(order.status, OrderStatus::Pending);
		assert!(order.partner.is_none());
		assert!(engine.ledger.entries().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_cycle_audits_ingested_orders() {
		let dir = TempDir::new().unwrap();
		let audit = Arc::new(OrderAuditLog::connect("sqlite::memory:").await.unwrap());
		let engine = engine(&dir, "").with_order_audit(audit.clone());

		engine.run_cycle().await.unwrap();
		engine.run_cycle().await.unwrap();

		let rows: Vec<(String, String, String)> =
			sqlx::query_as("SELECT id, store, status FROM Orders_details")
				.fetch_all(audit.pool())
				.await
				.unwrap();
		assert_eq!(
			rows,
			vec![("1".to_string(), "A".to_string(), "Pending".to_string())]
		);
	}

	#[test]
	fn test_tracking_timeout_conversion() {
		assert_eq!(tracking_timeout(None), None);
		assert_eq!(tracking_timeout(Some(2)), Some(Duration::from_secs(120)));
		assert_eq!(
			tracking_timeout(Some(u64::MAX)),
			Some(Duration::from_secs(u64::MAX))
		);
	}

	#[tokio::test]
	async fn test_empty_registry_skips_dispatch() {
		let dir = TempDir::new().unwrap();
		let engine = engine(&dir, "");
		std::fs::write(
			dir.path().join("registry.json"),
			r#"{"stores": [], "partners": []}"#,
		)
		.unwrap();

		let report = engine.run_cycle().await.unwrap();
		assert_eq!(report.ingested, 2);
		assert_eq!(report.placed, 0);
	}

	#[tokio::test]
	async fn test_missing_registry_skips_cycle() {
		let dir = TempDir::new().unwrap();
		let engine = engine(&dir, "");
		std::fs::remove_file(dir.path().join("registry.json")).unwrap();

		assert!(matches!(
			engine.run_cycle().await,
			Err(EngineError::Service(_))
		));
		assert!(engine.state_machine.orders().await.unwrap().is_empty());
	}
}
