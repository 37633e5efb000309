//! Availability index.
//!
//! Derives, from the stored contractor profiles, which contractors can take
//! work in a category right now. Availability is never stored on its own: it
//! follows from `active`, the category set and `current_order_id`, and the
//! latter only changes inside lifecycle batches.

use crewmatch_storage::{StorageError, StorageService};
use crewmatch_types::{ContractorProfile, StorageKey};
use std::sync::Arc;

/// Why a contractor cannot take an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailability {
	Inactive,
	Busy,
	CategoryNotServed,
}

impl Unavailability {
	pub fn reason(&self) -> &'static str {
		match self {
			Unavailability::Inactive => "profile is inactive",
			Unavailability::Busy => "already assigned to an active order",
			Unavailability::CategoryNotServed => "category not served",
		}
	}
}

/// Read-only view over contractor profiles.
pub struct AvailabilityIndex {
	storage: Arc<StorageService>,
}

impl AvailabilityIndex {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// The single availability predicate shared by search and accept.
	pub fn check(profile: &ContractorProfile, category: &str) -> Result<(), Unavailability> {
		if !profile.active {
			Err(Unavailability::Inactive)
		} else if profile.is_busy() {
			Err(Unavailability::Busy)
		} else if !profile.serves(category) {
			Err(Unavailability::CategoryNotServed)
		} else {
			Ok(())
		}
	}

	/// All profiles in insertion order.
	pub async fn profiles(&self) -> Result<Vec<ContractorProfile>, StorageError> {
		let mut profiles: Vec<ContractorProfile> = self.storage.list(StorageKey::Profiles).await?;
		profiles.sort_by_key(|p| p.seq);
		Ok(profiles)
	}

	/// Profiles that could accept an order in `category` right now, in
	/// insertion order.
	pub async fn available_for(
		&self,
		category: &str,
	) -> Result<Vec<ContractorProfile>, StorageError> {
		let profiles = self.profiles().await?;
		let total = profiles.len();
		let available: Vec<_> = profiles
			.into_iter()
			.filter(|p| Self::check(p, category).is_ok())
			.collect();
		tracing::debug!(
			category,
			total,
			available = available.len(),
			"Evaluated availability"
		);
		Ok(available)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use crewmatch_storage::implementations::memory::MemoryStorage;

	fn profile(seq: u64, user_id: &str, categories: &[&str]) -> ContractorProfile {
		let mut p = ContractorProfile::new(seq, user_id, Utc::now());
		p.categories = categories.iter().map(|c| c.to_string()).collect();
		p
	}

	#[test]
	fn test_check_reports_first_failing_condition() {
		let mut p = profile(1, "k1", &["comfort"]);
		assert_eq!(AvailabilityIndex::check(&p, "comfort"), Ok(()));
		assert_eq!(
			AvailabilityIndex::check(&p, "premium"),
			Err(Unavailability::CategoryNotServed)
		);

		p.assign("o1", Utc::now());
		assert_eq!(
			AvailabilityIndex::check(&p, "comfort"),
			Err(Unavailability::Busy)
		);

		p.active = false;
		assert_eq!(
			AvailabilityIndex::check(&p, "comfort"),
			Err(Unavailability::Inactive)
		);
	}

	#[tokio::test]
	async fn test_available_for_filters_and_keeps_insertion_order() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));

		// Ids sort differently from seq on purpose.
		let mut busy = profile(2, "a-busy", &["comfort"]);
		busy.assign("o1", Utc::now());
		let mut inactive = profile(3, "b-inactive", &["comfort"]);
		inactive.active = false;
		let profiles = [
			profile(4, "c-legacy", &[]),
			busy,
			inactive,
			profile(1, "z-first", &["comfort", "premium"]),
			profile(5, "d-other", &["econom"]),
		];
		for p in &profiles {
			storage
				.store(StorageKey::Profiles, &p.user_id, p)
				.await
				.unwrap();
		}

		let index = AvailabilityIndex::new(storage);
		let ids: Vec<String> = index
			.available_for("comfort")
			.await
			.unwrap()
			.into_iter()
			.map(|p| p.user_id)
			.collect();
		assert_eq!(ids, vec!["z-first", "c-legacy"]);
	}
}
