//! Core matching engine.
//!
//! [`MatchEngine`] wires the handlers together over one storage service, one
//! catalog and one event bus. It is cheap to clone and is what the HTTP layer
//! holds as state.

pub mod event_bus;
pub mod lifecycle;

pub use lifecycle::AssignmentReport;

use crate::handlers::{Directory, OrderLifecycle};
use crate::matching::{AvailabilityIndex, MatchingQuery};
use crewmatch_config::Config;
use crewmatch_storage::StorageService;
use crewmatch_types::Catalog;
use event_bus::EventBus;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while starting or stopping the engine.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Storage error: {0}")]
	Storage(#[from] crewmatch_storage::StorageError),
}

/// Order assignment engine.
#[derive(Clone)]
pub struct MatchEngine {
	config: Config,
	storage: Arc<StorageService>,
	catalog: Arc<Catalog>,
	event_bus: EventBus,
	orders: Arc<OrderLifecycle>,
	directory: Arc<Directory>,
	matching: Arc<MatchingQuery>,
}

impl MatchEngine {
	/// Creates an engine over `storage` using the limits and catalog of `config`.
	pub fn new(config: Config, storage: Arc<StorageService>) -> Self {
		let catalog = Arc::new(config.catalog());
		let event_bus = EventBus::new(config.lifecycle.event_capacity);
		let attempts = config.lifecycle.max_commit_attempts;

		let matching = Arc::new(MatchingQuery::new(
			storage.clone(),
			Arc::new(AvailabilityIndex::new(storage.clone())),
			catalog.clone(),
			config.matching.max_results,
		));
		let orders = Arc::new(OrderLifecycle::new(
			storage.clone(),
			catalog.clone(),
			event_bus.clone(),
			attempts,
		));
		let directory = Arc::new(Directory::new(storage.clone(), catalog.clone(), attempts));

		Self {
			config,
			storage,
			catalog,
			event_bus,
			orders,
			directory,
			matching,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn catalog(&self) -> &Arc<Catalog> {
		&self.catalog
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn orders(&self) -> &Arc<OrderLifecycle> {
		&self.orders
	}

	pub fn directory(&self) -> &Arc<Directory> {
		&self.directory
	}

	pub fn matching(&self) -> &Arc<MatchingQuery> {
		&self.matching
	}
}
