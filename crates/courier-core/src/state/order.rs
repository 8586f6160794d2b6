//! Order state machine implementation.
//!
//! Every status write goes through the transition table below:
//! Pending -> {Placed, Completed, Failed}, Placed -> {Completed, Failed}.
//! Completed and Failed are terminal. Single-order updates run inside an
//! order collection transaction so they never interleave with intake or a
//! reconciliation pass.

use courier_storage::StorageService;
use courier_types::{Order, OrderId, OrderStatus, StorageKey};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from:?} to {to:?}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not found: {0}")]
	OrderNotFound(String),
}

static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderStatus::Pending,
		HashSet::from([
			OrderStatus::Placed,
			OrderStatus::Completed,
			OrderStatus::Failed,
		]),
	);
	m.insert(
		OrderStatus::Placed,
		HashSet::from([OrderStatus::Completed, OrderStatus::Failed]),
	);
	m.insert(OrderStatus::Completed, HashSet::new()); // terminal
	m.insert(OrderStatus::Failed, HashSet::new()); // terminal
	m
});

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}

	/// Applies a validated status change to an in-memory order.
	pub fn apply_transition(order: &mut Order, to: OrderStatus) -> Result<(), OrderStateError> {
		if !Self::is_valid_transition(order.status, to) {
			return Err(OrderStateError::InvalidTransition {
				from: order.status,
				to,
			});
		}
		order.status = to;
		Ok(())
	}

	/// Updates one order with a closure and persists the collection.
	///
	/// Nothing is written when the closure fails.
	pub async fn update_order_with<F>(
		&self,
		order_id: &OrderId,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order) -> Result<(), OrderStateError>,
	{
		let txn = self.storage.begin(StorageKey::Orders).await;
		let mut orders: Vec<Order> = txn
			.load()
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;

		let order = orders
			.iter_mut()
			.find(|o| &o.id == order_id)
			.ok_or_else(|| OrderStateError::OrderNotFound(order_id.to_string()))?;

		updater(order)?;
		let updated = order.clone();

		txn.commit(&orders)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;

		Ok(updated)
	}

	/// Transitions an order to a new status with validation
	pub async fn transition_order_status(
		&self,
		order_id: &OrderId,
		new_status: OrderStatus,
	) -> Result<Order, OrderStateError> {
		self.update_order_with(order_id, |order| {
			Self::apply_transition(order, new_status)
		})
		.await
	}

	/// Gets an order by ID
	pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, OrderStateError> {
		self.orders()
			.await?
			.into_iter()
			.find(|o| &o.id == order_id)
			.ok_or_else(|| OrderStateError::OrderNotFound(order_id.to_string()))
	}

	/// Reads the whole order collection.
	pub async fn orders(&self) -> Result<Vec<Order>, OrderStateError> {
		self.storage
			.load_collection(StorageKey::Orders)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use courier_storage::implementations::memory::MemoryStorage;

	async fn machine_with(orders: Vec<Order>) -> OrderStateMachine {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		storage
			.begin(StorageKey::Orders)
			.await
			.commit(&orders)
			.await
			.unwrap();
		OrderStateMachine::new(storage)
	}

	#[test]
	fn test_transition_table() {
		use OrderStatus::*;

		assert!(OrderStateMachine::is_valid_transition(Pending, Placed));
		assert!(OrderStateMachine::is_valid_transition(Pending, Completed));
		assert!(OrderStateMachine::is_valid_transition(Placed, Completed));
		assert!(OrderStateMachine::is_valid_transition(Placed, Failed));
		assert!(!OrderStateMachine::is_valid_transition(Placed, Pending));
		assert!(!OrderStateMachine::is_valid_transition(Completed, Failed));
		assert!(!OrderStateMachine::is_valid_transition(Failed, Completed));
		assert!(!OrderStateMachine::is_valid_transition(Completed, Completed));
	}

	#[tokio::test]
	async fn test_transition_persists() {
		let machine = machine_with(vec![Order::new(1, "A"), Order::new(2, "A")]).await;

		let order = machine
			.transition_order_status(&OrderId::from(2), OrderStatus::Placed)
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Placed);

		let stored = machine.get_order(&OrderId::from(2)).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Placed);
		let untouched = machine.get_order(&OrderId::from(1)).await.unwrap();
		assert_eq!(untouched.status, OrderStatus::Pending);
	}

	#[tokio::test]
	async fn test_invalid_transition_is_not_written() {
		let mut completed = Order::new(1, "A");
		completed.status = OrderStatus::Completed;
		let machine = machine_with(vec![completed]).await;

		let result = machine
			.transition_order_status(&OrderId::from(1), OrderStatus::Failed)
			.await;
		assert!(matches!(
			result,
			Err(OrderStateError::InvalidTransition {
				from: OrderStatus::Completed,
				to: OrderStatus::Failed
			})
		));
		let stored = machine.get_order(&OrderId::from(1)).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Completed);
	}

	#[tokio::test]
	async fn test_missing_order() {
		let machine = machine_with(vec![]).await;
		assert!(matches!(
			machine
				.transition_order_status(&OrderId::from(9), OrderStatus::Placed)
				.await,
			Err(OrderStateError::OrderNotFound(_))
		));
	}
}
