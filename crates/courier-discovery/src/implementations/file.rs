//! File-backed order source.
//!
//! Reads a JSON array of raw store orders from disk, the way the store
//! collector drops its mock batches. A missing file is an empty batch.

use crate::{project_batch, DiscoveryError, OrderSourceInterface};
use async_trait::async_trait;
use courier_types::{non_empty_string, ConfigSchema, Field, FieldType, Order, Schema, ValidationError};
use std::path::PathBuf;

/// Order source reading a JSON array from a local file.
pub struct FileOrderSource {
	path: PathBuf,
}

impl FileOrderSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

#[async_trait]
impl OrderSourceInterface for FileOrderSource {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileOrderSourceSchema)
	}

	async fn fetch_orders(&self) -> Result<Vec<Order>, DiscoveryError> {
		let content = match tokio::fs::read(&self.path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				tracing::debug!(path = %self.path.display(), "Order file not present yet");
				return Ok(Vec::new());
			},
			Err(e) => {
				return Err(DiscoveryError::Io(format!(
					"{}: {}",
					self.path.display(),
					e
				)))
			},
		};

		let records: Vec<serde_json::Value> = serde_json::from_slice(&content)
			.map_err(|e| DiscoveryError::ParseError(format!("{}: {}", self.path.display(), e)))?;

		Ok(project_batch(records, "file"))
	}
}

/// Configuration schema for the file order source.
pub struct FileOrderSourceSchema;

impl ConfigSchema for FileOrderSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("path", FieldType::String).with_validator(non_empty_string)],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file order source from configuration.
///
/// Required configuration parameters:
/// - `path`: JSON file holding an array of raw orders
pub fn create_discovery(
	config: &toml::Value,
) -> Result<Box<dyn OrderSourceInterface>, DiscoveryError> {
	FileOrderSourceSchema
		.validate(config)
		.map_err(|e| DiscoveryError::ValidationError(format!("Invalid configuration: {}", e)))?;

	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DiscoveryError::ValidationError("path is required".to_string()))?;

	Ok(Box::new(FileOrderSource::new(path)))
}

/// Registry for the file order source.
pub struct Registry;

impl courier_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::DiscoveryFactory;

	fn factory() -> Self::Factory {
		create_discovery
	}
}

impl crate::DiscoveryRegistry for Registry {}
