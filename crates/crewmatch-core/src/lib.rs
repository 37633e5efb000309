//! Core order assignment engine for the crewmatch system.
//!
//! This crate holds the order lifecycle state machine, the contractor
//! availability index, the ranked matching query and the user directory. All
//! writes go through optimistic, all-or-nothing storage batches, which is what
//! keeps a contractor assigned to at most one active order under concurrent
//! requests.

pub mod builder;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod matching;
pub mod state;

pub use builder::{BuilderError, MatchBuilder, MatchFactories};
pub use engine::{event_bus::EventBus, AssignmentReport, EngineError, MatchEngine};
pub use error::{ErrorKind, LifecycleError};
pub use handlers::{Directory, OrderLifecycle};
pub use matching::{AvailabilityIndex, MatchingQuery, Unavailability};
pub use state::OrderStateMachine;

#[cfg(test)]
pub(crate) mod testing {
	use crate::{LifecycleError, MatchEngine};
	use crewmatch_config::builders::config::ConfigBuilder;
	use crewmatch_storage::implementations::file::FileStorage;
	use crewmatch_storage::implementations::memory::MemoryStorage;
	use crewmatch_storage::StorageService;
	use crewmatch_types::{ContractorProfile, Order, Role, UpsertProfileRequest, UpsertUserRequest};
	use std::path::Path;
	use std::sync::Arc;

	fn engine_over(storage: StorageService) -> MatchEngine {
		let config = ConfigBuilder::new()
			.category("premium", "Premium", false)
			.build();
		MatchEngine::new(config, Arc::new(storage))
	}

	/// Engine over fresh in-memory storage with `comfort`, `premium` and the
	/// `business` addon in the catalog.
	pub fn engine() -> MatchEngine {
		engine_over(StorageService::new(Box::new(MemoryStorage::new())))
	}

	/// Same catalog as [`engine`], persisted under `dir`.
	pub fn file_engine(dir: &Path) -> MatchEngine {
		engine_over(StorageService::new(Box::new(FileStorage::open(dir).unwrap())))
	}

	pub async fn client(engine: &MatchEngine, id: &str) {
		engine
			.directory()
			.upsert_user(UpsertUserRequest {
				id: id.to_string(),
				role: Some(Role::Client),
				name: Some(format!("Client {}", id)),
				..Default::default()
			})
			.await
			.unwrap();
	}

	/// Registers an active contractor serving `categories`.
	pub async fn contractor(engine: &MatchEngine, id: &str, categories: &[&str]) -> ContractorProfile {
		engine
			.directory()
			.upsert_user(UpsertUserRequest {
				id: id.to_string(),
				role: Some(Role::Contractor),
				name: Some(format!("Crew {}", id)),
				..Default::default()
			})
			.await
			.unwrap();
		engine
			.directory()
			.upsert_profile(UpsertProfileRequest {
				user_id: id.to_string(),
				experience_years: Some(3),
				categories: categories.iter().map(|c| c.to_string()).collect(),
				active: true,
			})
			.await
			.unwrap()
	}

	/// Runs every `(order_id, contractor_id)` accept concurrently.
	pub async fn accept_all(
		engine: &MatchEngine,
		attempts: Vec<(String, String)>,
	) -> Vec<Result<Order, LifecycleError>> {
		let handles = attempts.into_iter().map(|(order_id, contractor_id)| {
			let orders = engine.orders().clone();
			tokio::spawn(async move { orders.accept(&order_id, &contractor_id).await })
		});
		futures::future::join_all(handles)
			.await
			.into_iter()
			.map(|joined| joined.unwrap())
			.collect()
	}
}
