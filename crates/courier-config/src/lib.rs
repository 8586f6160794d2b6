//! Configuration module for the courier dispatch service.
//!
//! This module provides structures and utilities for managing dispatcher
//! configuration. It supports loading configuration from TOML files and
//! validates that all required values are set before any component is built.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)
//!
//! String values may reference environment variables as `${VAR}` or
//! `${VAR:-default}`.

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Scheduling and identity of this dispatcher instance.
	pub service: ServiceConfig,
	/// Backend holding the order collection and tracking ledger.
	pub storage: StorageConfig,
	/// Order sources and the partner registry location.
	pub discovery: DiscoveryConfig,
	/// Partner gateway selection.
	pub delivery: DeliveryConfig,
	/// Side effects of order intake.
	#[serde(default)]
	pub intake: IntakeConfig,
	/// Reconciliation behaviour.
	#[serde(default)]
	pub reconciler: ReconcilerConfig,
	/// Control endpoint.
	pub api: Option<ApiConfig>,
}

/// Scheduling and identity of the dispatcher instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier used in logs.
	pub id: String,
	/// Seconds between pipeline cycles (intake, quote, place, poll, track).
	#[serde(default = "default_interval_seconds")]
	pub cycle_interval_seconds: u64,
	/// Seconds between reconciliation passes.
	#[serde(default = "default_interval_seconds")]
	pub reconcile_interval_seconds: u64,
	/// Delay between a successful placement and the first status poll.
	#[serde(default = "default_status_poll_delay_ms")]
	pub status_poll_delay_ms: u64,
	/// Upper bound on orders advanced concurrently within one cycle.
	#[serde(default = "default_max_concurrent_orders")]
	pub max_concurrent_orders: usize,
}

fn default_interval_seconds() -> u64 {
	15
}

fn default_status_poll_delay_ms() -> u64 {
	3000
}

fn default_max_concurrent_orders() -> usize {
	4
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for order discovery.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
	/// Path to the partner registry document (`{stores, partners}`).
	pub registry_path: String,
	/// Map of order source names to their configurations.
	/// Every configured source is polled each cycle.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the partner gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	/// Which gateway implementation to use (`simulated` or `http`).
	pub primary: String,
	/// Map of gateway implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Timeout applied to every partner call.
	#[serde(default = "default_request_timeout_seconds")]
	pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
	10
}

/// Configuration for order intake.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IntakeConfig {
	/// SQLite database receiving one audit row per accepted order, e.g.
	/// `sqlite://data/orders.sqlite`. No audit is written when unset.
	pub audit_database_url: Option<String>,
}

/// Configuration for the reconciler.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReconcilerConfig {
	/// Minutes after which a placed order with incomplete tracking is failed.
	/// Disabled when unset.
	pub tracking_timeout_minutes: Option<u64>,
}

/// Configuration for the HTTP control endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	8000
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	let mut result = input.to_string();
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration.
	///
	/// Checks identity, interval bounds, that each primary implementation is
	/// configured, and that at least one order source exists.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}
		for (name, value) in [
			("cycle_interval_seconds", self.service.cycle_interval_seconds),
			(
				"reconcile_interval_seconds",
				self.service.reconcile_interval_seconds,
			),
		] {
			if value == 0 || value > 86400 {
				return Err(ConfigError::Validation(format!(
					"Service {} must be between 1 and 86400",
					name
				)));
			}
		}
		if self.service.max_concurrent_orders == 0 {
			return Err(ConfigError::Validation(
				"Service max_concurrent_orders must be at least 1".into(),
			));
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		if self.discovery.registry_path.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Discovery registry_path cannot be empty".into(),
			));
		}
		if self.discovery.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one discovery implementation required".into(),
			));
		}

		if !self
			.delivery
			.implementations
			.contains_key(&self.delivery.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary delivery '{}' not found in implementations",
				self.delivery.primary
			)));
		}
		if self.delivery.request_timeout_seconds == 0
			|| self.delivery.request_timeout_seconds > 300
		{
			return Err(ConfigError::Validation(
				"Delivery request_timeout_seconds must be between 1 and 300".into(),
			));
		}

		if let Some(url) = &self.intake.audit_database_url {
			if !url.starts_with("sqlite:") {
				return Err(ConfigError::Validation(format!(
					"Intake audit_database_url '{}' must be a sqlite: URL",
					url
				)));
			}
		}

		if self.reconciler.tracking_timeout_minutes == Some(0) {
			return Err(ConfigError::Validation(
				"Reconciler tracking_timeout_minutes must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
