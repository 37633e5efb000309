//! Builder for constructing match engines.
//!
//! Composes a [`MatchEngine`] from the loaded configuration and a map of
//! storage factories, so the binary decides which backends exist and the
//! configuration decides which one is used.

use crate::engine::MatchEngine;
use crewmatch_config::Config;
use crewmatch_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions available to the builder, keyed by implementation name.
pub struct MatchFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builder for constructing a MatchEngine with a pluggable storage backend.
pub struct MatchBuilder {
	config: Config,
}

impl MatchBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Creates the primary storage backend and the engine on top of it.
	///
	/// Only the primary implementation is instantiated; other configured
	/// backends stay untouched so that, for example, an unused file store does
	/// not take its directory lock.
	pub async fn build<SF>(self, factories: MatchFactories<SF>) -> Result<MatchEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let primary = self.config.storage.primary.as_str();
		let storage_config = self
			.config
			.storage
			.implementations
			.get(primary)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary storage '{}' has no configuration section",
					primary
				))
			})?;
		let factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;

		let backend = match factory(storage_config) {
			Ok(backend) => backend,
			Err(e) => {
				tracing::error!(
					component = "storage",
					implementation = %primary,
					error = %e,
					"Failed to create storage implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create storage implementation '{}': {}",
					primary, e
				)));
			},
		};
		backend
			.config_schema()
			.validate(storage_config)
			.map_err(|e| {
				BuilderError::Config(format!("Invalid configuration for storage '{}': {}", primary, e))
			})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");

		let storage = Arc::new(StorageService::new(backend));
		let engine = MatchEngine::new(self.config, storage);
		tracing::info!(
			component = "catalog",
			categories = engine.catalog().len(),
			selectable = engine.catalog().selectable().count(),
			"Loaded"
		);
		Ok(engine)
	}
}
