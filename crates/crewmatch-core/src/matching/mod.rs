//! Matching query.
//!
//! Turns the available contractors for a category into a ranked, capped
//! candidate list for presentation. Searching is a pure read and can be
//! repeated freely before any assignment happens.

pub mod availability;

pub use availability::{AvailabilityIndex, Unavailability};

use crate::LifecycleError;
use crewmatch_storage::StorageService;
use crewmatch_types::{
	truncate_id, Catalog, CatalogError, ContractorCandidate, ContractorProfile, StorageKey, User,
};
use std::sync::Arc;
use tracing::instrument;

/// Orders profiles by rating, then completed orders, both descending.
///
/// Remaining ties keep insertion order (`seq`).
pub fn rank(mut profiles: Vec<ContractorProfile>, max_results: usize) -> Vec<ContractorProfile> {
	profiles.sort_by(|a, b| {
		b.rating
			.total_cmp(&a.rating)
			.then_with(|| b.completed_orders().cmp(&a.completed_orders()))
			.then_with(|| a.seq.cmp(&b.seq))
	});
	profiles.truncate(max_results);
	profiles
}

/// Ranked contractor search.
pub struct MatchingQuery {
	storage: Arc<StorageService>,
	index: Arc<AvailabilityIndex>,
	catalog: Arc<Catalog>,
	max_results: usize,
}

impl MatchingQuery {
	pub fn new(
		storage: Arc<StorageService>,
		index: Arc<AvailabilityIndex>,
		catalog: Arc<Catalog>,
		max_results: usize,
	) -> Self {
		Self {
			storage,
			index,
			catalog,
			max_results,
		}
	}

	/// Returns up to `max_results` available contractors for `category`.
	///
	/// Unknown and addon categories yield an empty list rather than an error.
	#[instrument(skip_all, fields(category = %category))]
	pub async fn search(&self, category: &str) -> Result<Vec<ContractorCandidate>, LifecycleError> {
		let category = match self.catalog.orderable(category) {
			Ok(_) => Catalog::normalize_code(category),
			Err(CatalogError::Unknown(code)) | Err(CatalogError::AddonOnly(code)) => {
				tracing::debug!(category = %code, "Search for non-orderable category");
				return Ok(Vec::new());
			},
		};

		let available = self.index.available_for(&category).await?;
		let available_count = available.len();
		let ranked = rank(available, self.max_results);

		let mut candidates = Vec::with_capacity(ranked.len());
		for profile in ranked {
			let user: Option<User> = self
				.storage
				.try_retrieve(StorageKey::Users, &profile.user_id)
				.await?;
			if user.is_none() {
				tracing::warn!(
					contractor = %truncate_id(&profile.user_id),
					"Profile without user record"
				);
			}
			let (name, phone, avatar_url) = user
				.map(|u| (u.name, u.phone, u.avatar_url))
				.unwrap_or_default();
			candidates.push(ContractorCandidate {
				profile,
				name,
				phone,
				avatar_url,
			});
		}

		tracing::debug!(
			available = available_count,
			returned = candidates.len(),
			"Search completed"
		);
		Ok(candidates)
	}

	pub fn max_results(&self) -> usize {
		self.max_results
	}
}
