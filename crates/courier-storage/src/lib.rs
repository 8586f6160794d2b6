//! Storage module for the courier dispatch service.
//!
//! This module provides abstractions for the persisted collections (the order
//! collection and the tracking ledger), supporting different backend
//! implementations such as in-memory or file-based storage.
//!
//! Both collections are stored whole, as JSON arrays. Every read-modify-write
//! of a collection goes through a [`CollectionTxn`], which holds that
//! collection's lock until it is dropped so that the pipeline and the
//! reconciler never interleave their writes.

use async_trait::async_trait;
use courier_types::{ConfigSchema, ImplementationRegistry, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub mod audit;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Backends store opaque byte documents under string keys. A `set_bytes`
/// must be visible in full or not at all to a subsequent `get_bytes`.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Replaces the document stored under the given key.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level storage service providing typed access to whole collections.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
	/// One lock per collection, serializing read-modify-write cycles.
	locks: HashMap<StorageKey, Arc<Mutex<()>>>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		let locks = StorageKey::all()
			.map(|key| (key, Arc::new(Mutex::new(()))))
			.collect();
		Self { backend, locks }
	}

	/// Reads a whole collection without taking its lock.
	///
	/// A collection that was never written is empty. A document that exists
	/// but does not parse is reported as [`StorageError::Serialization`].
	pub async fn load_collection<T: DeserializeOwned>(
		&self,
		key: StorageKey,
	) -> Result<Vec<T>, StorageError> {
		read_collection(self.backend.as_ref(), key).await
	}

	/// Starts a read-modify-write transaction on a collection.
	///
	/// Waits until no other transaction holds the collection.
	pub async fn begin(&self, key: StorageKey) -> CollectionTxn<'_> {
		let guard = match self.locks.get(&key) {
			Some(lock) => Some(lock.clone().lock_owned().await),
			None => None,
		};
		CollectionTxn {
			backend: self.backend.as_ref(),
			key,
			_guard: guard,
		}
	}

	/// Checks whether a collection has ever been written.
	pub async fn exists(&self, key: StorageKey) -> Result<bool, StorageError> {
		self.backend.exists(key.as_str()).await
	}
}

/// Exclusive access to one collection for a read-modify-write cycle.
///
/// The collection lock is released when the transaction is dropped, whether
/// or not [`commit`](CollectionTxn::commit) was called.
pub struct CollectionTxn<'a> {
	backend: &'a dyn StorageInterface,
	key: StorageKey,
	_guard: Option<OwnedMutexGuard<()>>,
}

impl CollectionTxn<'_> {
	/// Reads the collection under the transaction's lock.
	pub async fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>, StorageError> {
		read_collection(self.backend, self.key).await
	}

	/// Persists the full collection, replacing the previous document.
	pub async fn commit<T: Serialize>(&self, items: &[T]) -> Result<(), StorageError> {
		let bytes = serde_json::to_vec_pretty(items)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(self.key.as_str(), bytes).await
	}
}

async fn read_collection<T: DeserializeOwned>(
	backend: &dyn StorageInterface,
	key: StorageKey,
) -> Result<Vec<T>, StorageError> {
	match backend.get_bytes(key.as_str()).await {
		Ok(bytes) => {
			serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
		},
		Err(StorageError::NotFound) => Ok(Vec::new()),
		Err(e) => Err(e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use std::time::Duration;

	fn service() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	#[tokio::test]
	async fn test_missing_collection_is_empty() {
		let storage = service();
		let items: Vec<u32> = storage.load_collection(StorageKey::Orders).await.unwrap();
		assert!(items.is_empty());
		assert!(!storage.exists(StorageKey::Orders).await.unwrap());
	}

	#[tokio::test]
	async fn test_commit_then_load() {
		let storage = service();
		let txn = storage.begin(StorageKey::Tracking).await;
		txn.commit(&[1u32, 2, 3]).await.unwrap();
		drop(txn);

		let items: Vec<u32> = storage.load_collection(StorageKey::Tracking).await.unwrap();
		assert_eq!(items, vec![1, 2, 3]);
		let orders: Vec<u32> = storage.load_collection(StorageKey::Orders).await.unwrap();
		assert!(orders.is_empty());
	}

	#[tokio::test]
	async fn test_corrupt_collection_is_an_error() {
		let backend = MemoryStorage::new();
		backend
			.set_bytes("orders", b"[{not json".to_vec())
			.await
			.unwrap();
		let storage = StorageService::new(Box::new(backend));

		let result: Result<Vec<u32>, _> = storage.load_collection(StorageKey::Orders).await;
		assert!(matches!(result, Err(StorageError::Serialization(_))));
	}

	#[tokio::test]
	async fn test_transactions_do_not_interleave() {
		let storage = service();

		let mut handles = Vec::new();
		for _ in 0..8 {
			let storage = storage.clone();
			handles.push(tokio::spawn(async move {
				let txn = storage.begin(StorageKey::Orders).await;
				let mut items: Vec<u32> = txn.load().await.unwrap();
				let next = items.len() as u32;
				tokio::time::sleep(Duration::from_millis(5)).await;
				items.push(next);
				txn.commit(&items).await.unwrap();
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}

		let items: Vec<u32> = storage.load_collection(StorageKey::Orders).await.unwrap();
		assert_eq!(items, (0..8).collect::<Vec<_>>());
	}
}
