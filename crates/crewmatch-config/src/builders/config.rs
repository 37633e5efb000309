//! Configuration builder for creating test and development configurations.
//!
//! This module provides utilities for constructing Config instances with
//! sensible defaults, particularly useful for testing scenarios.

use crate::{
	ApiConfig, CatalogConfig, Config, LifecycleConfig, MatchingConfig, ServiceConfig,
	StorageConfig,
};
use crewmatch_types::{CategoryEntry, PriceRange};
use std::collections::{BTreeMap, HashMap};

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults to in-memory storage and a two-entry catalog: `comfort`
/// (orderable) and `business` (addon).
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	storage_primary: String,
	max_results: usize,
	max_commit_attempts: u32,
	event_capacity: usize,
	categories: BTreeMap<String, CategoryEntry>,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn entry(name: &str, min: u32, max: u32, is_addon: bool) -> CategoryEntry {
	CategoryEntry {
		name: name.to_string(),
		description: String::new(),
		price_range: PriceRange { min, max },
		days: String::new(),
		features: Vec::new(),
		is_addon,
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		let mut categories = BTreeMap::new();
		categories.insert("comfort".to_string(), entry("Comfort", 550, 850, false));
		categories.insert("business".to_string(), entry("Business", 200, 300, true));

		Self {
			service_id: "crewmatch-test".to_string(),
			storage_primary: "memory".to_string(),
			max_results: 10,
			max_commit_attempts: 3,
			event_capacity: 64,
			categories,
			api: None,
		}
	}

	/// Sets the service ID.
	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the primary storage implementation.
	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	/// Sets the search result cap.
	pub fn max_results(mut self, max_results: usize) -> Self {
		self.max_results = max_results;
		self
	}

	/// Sets the optimistic-concurrency retry budget.
	pub fn max_commit_attempts(mut self, attempts: u32) -> Self {
		self.max_commit_attempts = attempts;
		self
	}

	/// Adds (or replaces) a catalog category.
	pub fn category(mut self, code: &str, name: &str, is_addon: bool) -> Self {
		self.categories
			.insert(code.to_string(), entry(name, 100, 200, is_addon));
		self
	}

	/// Sets the API configuration.
	pub fn api(mut self, api: ApiConfig) -> Self {
		self.api = Some(api);
		self
	}

	/// Builds the `Config` instance.
	pub fn build(self) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(
			self.storage_primary.clone(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations,
			},
			matching: MatchingConfig {
				max_results: self.max_results,
			},
			lifecycle: LifecycleConfig {
				max_commit_attempts: self.max_commit_attempts,
				event_capacity: self.event_capacity,
			},
			catalog: CatalogConfig {
				categories: self.categories,
			},
			api: self.api,
		}
	}
}
