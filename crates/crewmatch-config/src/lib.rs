//! Configuration module for the crewmatch system.
//!
//! This module provides structures and utilities for managing service
//! configuration. It supports loading configuration from TOML files and
//! provides validation to ensure all required configuration values are
//! properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files, except `catalog`,
//!   whose categories may be spread over several files

mod env;
mod loader;

#[cfg(feature = "testing")]
pub mod builders {
	pub mod config;
}

use crewmatch_types::{Catalog, CategoryEntry};
use env::resolve_env_vars;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Failure to read, parse or accept a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Malformed TOML or a shape that does not deserialize.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Well-formed but rejected by a semantic check.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Message only; the default rendering echoes the input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
///
/// This structure contains all configuration sections required for the
/// service to operate: identity, storage, matching and lifecycle tuning, the
/// category catalog, and the API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to the service instance.
	pub service: ServiceConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	#[serde(default)]
	pub matching: MatchingConfig,
	#[serde(default)]
	pub lifecycle: LifecycleConfig,
	/// Category catalog; may be spread over several included files.
	#[serde(default)]
	pub catalog: CatalogConfig,
	/// HTTP API server; absent means no server.
	pub api: Option<ApiConfig>,
}

/// Identity of this instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier, used in logs.
	pub id: String,
}

/// Storage backends and the one the engine runs on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Name of the backend to build; must be a key of `implementations`.
	pub primary: String,
	/// Backend name to its raw configuration table.
	pub implementations: HashMap<String, toml::Value>,
}

/// Tuning of the candidate search.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
	/// Maximum number of candidates returned by a search.
	pub max_results: usize,
}

impl Default for MatchingConfig {
	fn default() -> Self {
		Self { max_results: 10 }
	}
}

/// Tuning of the order lifecycle engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
	/// How many times an operation re-reads and retries after losing a
	/// conditional write before reporting contention.
	pub max_commit_attempts: u32,
	/// Buffer size of the lifecycle event bus.
	pub event_capacity: usize,
}

impl Default for LifecycleConfig {
	fn default() -> Self {
		Self {
			max_commit_attempts: 3,
			event_capacity: 1000,
		}
	}
}

/// The category catalog, keyed by category code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
	#[serde(default)]
	pub categories: BTreeMap<String, CategoryEntry>,
}

/// The `[api]` section. Omitted keys take the values of [`ApiConfig::default`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
	pub enabled: bool,
	pub host: String,
	pub port: u16,
	/// Per-request deadline; slower requests get 408.
	pub timeout_seconds: u64,
	/// Body size limit in bytes.
	pub max_request_size: usize,
	/// Absent means any origin, header and method.
	pub cors: Option<CorsConfig>,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			host: "127.0.0.1".to_string(),
			port: 3000,
			timeout_seconds: 30,
			max_request_size: 1024 * 1024,
			cors: None,
		}
	}
}

/// Cross-origin policy of the API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Exact origins, or `"*"` for any.
	pub allowed_origins: Vec<String>,
	/// Empty means any header.
	#[serde(default)]
	pub allowed_headers: Vec<String>,
	/// Empty means any method.
	#[serde(default)]
	pub allowed_methods: Vec<String>,
}

impl Config {
	/// Loads configuration from a file.
	///
	/// Include directives are followed relative to the including file; see
	/// [`loader::ConfigLoader`] for the merge rules.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Builds the read-only catalog from the `[catalog]` section.
	pub fn catalog(&self) -> Catalog {
		Catalog::new(self.catalog.categories.clone())
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Ensures the service ID is not empty
	/// - Validates the primary storage backend is one of the implementations
	/// - Checks matching and lifecycle bounds
	/// - Requires at least one orderable catalog entry with sane prices
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		// Validate storage config
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
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

		if !(1..=100).contains(&self.matching.max_results) {
			return Err(ConfigError::Validation(
				"matching.max_results must be between 1 and 100".into(),
			));
		}
		if !(1..=16).contains(&self.lifecycle.max_commit_attempts) {
			return Err(ConfigError::Validation(
				"lifecycle.max_commit_attempts must be between 1 and 16".into(),
			));
		}
		if self.lifecycle.event_capacity == 0 {
			return Err(ConfigError::Validation(
				"lifecycle.event_capacity must be at least 1".into(),
			));
		}

		self.validate_catalog()?;

		if let Some(api) = self.api.as_ref().filter(|api| api.enabled) {
			if api.timeout_seconds == 0 {
				return Err(ConfigError::Validation(
					"api.timeout_seconds must be greater than 0".into(),
				));
			}
			if api.max_request_size == 0 {
				return Err(ConfigError::Validation(
					"api.max_request_size must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}

	fn validate_catalog(&self) -> Result<(), ConfigError> {
		let mut seen = HashSet::new();
		for (code, entry) in &self.catalog.categories {
			let normalized = Catalog::normalize_code(code);
			if normalized.is_empty() {
				return Err(ConfigError::Validation(
					"Catalog category codes cannot be empty".into(),
				));
			}
			if !seen.insert(normalized.clone()) {
				return Err(ConfigError::Validation(format!(
					"Catalog category '{}' is defined more than once",
					normalized
				)));
			}
			if entry.name.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Catalog category '{}' must have a name",
					code
				)));
			}
			if entry.price_range.min > entry.price_range.max {
				return Err(ConfigError::Validation(format!(
					"Catalog category '{}' has price_range.min above price_range.max",
					code
				)));
			}
		}

		if !self.catalog.categories.values().any(|e| !e.is_addon) {
			return Err(ConfigError::Validation(
				"Catalog must contain at least one orderable (non-addon) category".into(),
			));
		}
		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
