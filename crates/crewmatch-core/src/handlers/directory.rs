//! User directory.
//!
//! Users are created on first interaction and patched afterwards. A user with
//! the contractor role may own one profile describing what they can do. The
//! directory never touches a profile's assignment, rating or completion
//! counter; those belong to the lifecycle engine and to external rating.

use super::{committed, retry_on_conflict};
use crate::LifecycleError;
use chrono::Utc;
use crewmatch_storage::{StorageService, Versioned};
use crewmatch_types::{
	truncate_id, Catalog, CatalogError, ContractorProfile, Role, StorageKey, UpsertProfileRequest,
	UpsertUserRequest, User,
};
use std::sync::Arc;
use tracing::instrument;

/// Sequence record that numbers profiles in creation order.
const PROFILE_SEQUENCE: &str = "profiles";

/// Handler for user and contractor profile records.
pub struct Directory {
	storage: Arc<StorageService>,
	catalog: Arc<Catalog>,
	max_attempts: u32,
}

impl Directory {
	pub fn new(storage: Arc<StorageService>, catalog: Arc<Catalog>, max_attempts: u32) -> Self {
		Self {
			storage,
			catalog,
			max_attempts,
		}
	}

	/// Creates a user or patches the fields present in `request`.
	///
	/// Moving a user away from the contractor role deactivates their profile
	/// in the same batch, so they stop surfacing in searches until they
	/// reconfigure it.
	#[instrument(skip_all, fields(user = %truncate_id(&request.id)))]
	pub async fn upsert_user(&self, request: UpsertUserRequest) -> Result<User, LifecycleError> {
		let id = request.id.trim();
		if id.is_empty() {
			return Err(LifecycleError::InvalidField {
				field: "id",
				message: "user id cannot be empty".into(),
			});
		}

		retry_on_conflict("upsert_user", self.max_attempts, || {
			self.try_upsert_user(id, &request)
		})
		.await
	}

	async fn try_upsert_user(
		&self,
		id: &str,
		request: &UpsertUserRequest,
	) -> Result<Option<User>, LifecycleError> {
		let now = Utc::now();
		let existing: Option<Versioned<User>> = self
			.storage
			.try_retrieve_versioned(StorageKey::Users, id)
			.await?;
		let mut tx = self.storage.transaction();

		let Some(current) = existing else {
			let role = request.role.ok_or_else(|| LifecycleError::InvalidRole {
				user_id: id.to_string(),
				reason: "a role is required when registering".into(),
			})?;
			let user = User {
				id: id.to_string(),
				role,
				name: request.name.clone(),
				phone: request.phone.clone(),
				avatar_url: request.avatar_url.clone(),
				created_at: now,
			};
			tx.insert(StorageKey::Users, id, &user)?;
			if !committed(tx.commit().await)? {
				return Ok(None);
			}
			tracing::info!(role = %role, "Registered user");
			return Ok(Some(user));
		};

		let mut user = current.value.clone();
		if let Some(name) = &request.name {
			user.name = Some(name.clone());
		}
		if let Some(phone) = &request.phone {
			user.phone = Some(phone.clone());
		}
		if let Some(avatar_url) = &request.avatar_url {
			user.avatar_url = Some(avatar_url.clone());
		}
		if let Some(role) = request.role {
			user.role = role;
		}
		if user == current.value {
			return Ok(Some(user));
		}

		let left_contractor_role =
			current.value.has_role(Role::Contractor) && !user.has_role(Role::Contractor);
		let mut deactivated = false;
		if left_contractor_role {
			let profile: Option<Versioned<ContractorProfile>> = self
				.storage
				.try_retrieve_versioned(StorageKey::Profiles, id)
				.await?;
			if let Some(previous) = profile.filter(|p| p.value.active) {
				let mut updated = previous.value.clone();
				updated.active = false;
				updated.updated_at = now;
				tx.replace(StorageKey::Profiles, id, &previous, &updated)?;
				deactivated = true;
			}
		}
		tx.replace(StorageKey::Users, id, &current, &user)?;

		if !committed(tx.commit().await)? {
			return Ok(None);
		}
		if current.value.role != user.role {
			tracing::info!(from = %current.value.role, to = %user.role, deactivated, "Changed user role");
		} else {
			tracing::debug!("Updated user");
		}
		Ok(Some(user))
	}

	/// Returns a user together with their contractor profile, if any.
	pub async fn get_user(
		&self,
		id: &str,
	) -> Result<(User, Option<ContractorProfile>), LifecycleError> {
		let user: User = self
			.storage
			.try_retrieve(StorageKey::Users, id)
			.await?
			.ok_or_else(|| LifecycleError::user_not_found(id))?;
		let profile = self.storage.try_retrieve(StorageKey::Profiles, id).await?;
		Ok((user, profile))
	}

	/// Creates or updates a contractor's profile.
	///
	/// Categories are normalized (trimmed, lowercased, de-duplicated, order
	/// kept) and must all exist in the catalog. An empty set is accepted and
	/// matches every category in search.
	#[instrument(skip_all, fields(contractor = %truncate_id(&request.user_id)))]
	pub async fn upsert_profile(
		&self,
		request: UpsertProfileRequest,
	) -> Result<ContractorProfile, LifecycleError> {
		let categories = self.normalize_categories(&request.categories)?;
		let user_id = request.user_id.trim();

		retry_on_conflict("upsert_profile", self.max_attempts, || {
			self.try_upsert_profile(user_id, &categories, &request)
		})
		.await
	}

	/// Profiles list standalone categories only; addons are never matched on.
	fn normalize_categories(&self, raw: &[String]) -> Result<Vec<String>, LifecycleError> {
		let mut categories: Vec<String> = Vec::with_capacity(raw.len());
		for tag in raw {
			let code = match self.catalog.orderable(tag) {
				Ok(_) => Catalog::normalize_code(tag),
				Err(CatalogError::Unknown(code)) | Err(CatalogError::AddonOnly(code)) => {
					return Err(LifecycleError::UnknownCategory(code));
				},
			};
			if !categories.contains(&code) {
				categories.push(code);
			}
		}
		Ok(categories)
	}

	async fn try_upsert_profile(
		&self,
		user_id: &str,
		categories: &[String],
		request: &UpsertProfileRequest,
	) -> Result<Option<ContractorProfile>, LifecycleError> {
		let now = Utc::now();
		let user: Versioned<User> = self
			.storage
			.try_retrieve_versioned(StorageKey::Users, user_id)
			.await?
			.ok_or_else(|| LifecycleError::user_not_found(user_id))?;
		if !user.value.has_role(Role::Contractor) {
			return Err(LifecycleError::InvalidRole {
				user_id: user_id.to_string(),
				reason: format!("only contractors have profiles, user is a {}", user.value.role),
			});
		}

		let existing: Option<Versioned<ContractorProfile>> = self
			.storage
			.try_retrieve_versioned(StorageKey::Profiles, user_id)
			.await?;
		let mut tx = self.storage.transaction();

		let profile = match existing {
			Some(previous) => {
				let mut profile = previous.value.clone();
				profile.categories = categories.to_vec();
				if request.experience_years.is_some() {
					profile.experience_years = request.experience_years;
				}
				profile.active = request.active;
				if profile == previous.value {
					return Ok(Some(profile));
				}
				profile.updated_at = now;
				tx.replace(StorageKey::Profiles, user_id, &previous, &profile)?;
				profile
			},
			None => {
				let sequence: Option<Versioned<u64>> = self
					.storage
					.try_retrieve_versioned(StorageKey::Sequences, PROFILE_SEQUENCE)
					.await?;
				let seq = match &sequence {
					Some(current) => {
						let next = current.value + 1;
						tx.replace(StorageKey::Sequences, PROFILE_SEQUENCE, current, &next)?;
						next
					},
					None => {
						tx.insert(StorageKey::Sequences, PROFILE_SEQUENCE, &1u64)?;
						1
					},
				};

				let mut profile = ContractorProfile::new(seq, user_id, now);
				profile.categories = categories.to_vec();
				profile.experience_years = request.experience_years;
				profile.active = request.active;
				tx.insert(StorageKey::Profiles, user_id, &profile)?;
				profile
			},
		};

		// Guards against a concurrent role change.
		tx.replace(StorageKey::Users, user_id, &user, &user.value)?;

		if !committed(tx.commit().await)? {
			return Ok(None);
		}
		tracing::info!(
			seq = profile.seq,
			categories = ?profile.categories,
			active = profile.active,
			"Saved contractor profile"
		);
		Ok(Some(profile))
	}
}
