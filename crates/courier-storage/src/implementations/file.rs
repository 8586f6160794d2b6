//! File-based storage backend.
//!
//! Each collection lives in its own JSON document under a base directory.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader sees either the previous document or the new one in full.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use courier_types::{
	non_empty_string, ConfigSchema, Field, FieldType, Schema, StorageKey, ValidationError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;

/// File name overrides for the persisted collections.
///
/// Configured with one `file_<key>` entry per [`StorageKey`], for example
/// `file_tracking = "track.json"`. Keys without an override use
/// `<key>.json`.
#[derive(Debug, Clone, Default)]
pub struct FileNames {
	names: HashMap<StorageKey, String>,
}

impl FileNames {
	fn from_config(config: &toml::Value) -> Self {
		let mut names = HashMap::new();

		if let Some(table) = config.as_table() {
			for storage_key in StorageKey::all() {
				let config_key = format!("file_{}", storage_key.as_str());
				if let Some(name) = table.get(&config_key).and_then(|v| v.as_str()) {
					names.insert(storage_key, name.to_string());
				}
			}
		}

		Self { names }
	}

	fn file_name(&self, key: &str) -> String {
		key.parse::<StorageKey>()
			.ok()
			.and_then(|sk| self.names.get(&sk).cloned())
			.unwrap_or_else(|| format!("{}.json", key.replace(['/', ':'], "_")))
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Per-collection file names.
	file_names: FileNames,
}

impl FileStorage {
	/// Creates a new FileStorage rooted at `base_path`.
	pub fn new(base_path: PathBuf, file_names: FileNames) -> Self {
		Self {
			base_path,
			file_names,
		}
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path.join(self.file_names.file_name(key))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(format!(
				"Failed to read {}: {}",
				path.display(),
				e
			))),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let temp_path = path.with_extension("json.tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		tracing::trace!(path = %path.display(), "Collection written");
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields =
			vec![Field::new("storage_path", FieldType::String).with_validator(non_empty_string)];

		for storage_key in StorageKey::all() {
			optional_fields.push(
				Field::new(format!("file_{}", storage_key.as_str()), FieldType::String)
					.with_validator(non_empty_string),
			);
		}

		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for the collection files (default: "./data")
/// - `file_orders`: File name of the order collection (default: "orders.json")
/// - `file_tracking`: File name of the tracking ledger (default: "tracking.json")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data")
		.to_string();

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		FileNames::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl courier_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
