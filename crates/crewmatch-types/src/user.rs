//! User and contractor profile types.
//!
//! A user is identified by an opaque external id (the messaging identity the
//! front end hands us) and carries exactly one role at a time. Users with the
//! contractor role may own one [`ContractorProfile`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a user. Roles are mutually exclusive but may change over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	/// Requests work and owns orders.
	Client,
	/// Provides work and may be assigned to orders.
	Contractor,
}

impl Role {
	/// Returns the canonical string representation of the role.
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Client => "client",
			Role::Contractor => "contractor",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"client" => Ok(Role::Client),
			"contractor" => Ok(Role::Contractor),
			other => Err(format!("unknown role '{}'", other)),
		}
	}
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
	/// Opaque, stable external identity.
	pub id: String,
	/// Current role.
	pub role: Role,
	/// Display name.
	pub name: Option<String>,
	/// Contact phone.
	pub phone: Option<String>,
	/// Avatar image URL.
	pub avatar_url: Option<String>,
	/// When the user first interacted with the system.
	pub created_at: DateTime<Utc>,
}

impl User {
	pub fn has_role(&self, role: Role) -> bool {
		self.role == role
	}
}

/// Capability and availability record of a contractor.
///
/// `current_order_id` is the exclusivity flag: `Some` while the contractor is
/// assigned to an accepted or in-progress order, `None` while available. It is
/// only changed through [`ContractorProfile::assign`] and
/// [`ContractorProfile::release`], which the lifecycle engine calls inside the
/// same atomic batch that moves the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorProfile {
	/// Insertion sequence, used as the final ranking tie-break.
	pub seq: u64,
	/// External id of the owning user.
	pub user_id: String,
	/// Years of experience.
	pub experience_years: Option<u32>,
	/// Category codes this contractor serves.
	#[serde(default)]
	pub categories: Vec<String>,
	/// Externally computed rating, read-only here.
	#[serde(default)]
	pub rating: f64,
	#[serde(default)]
	completed_orders: u64,
	/// Operator or self toggle.
	pub active: bool,
	#[serde(default)]
	current_order_id: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl ContractorProfile {
	/// Creates an empty, active profile that is not assigned to any order.
	pub fn new(seq: u64, user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
		Self {
			seq,
			user_id: user_id.into(),
			experience_years: None,
			categories: Vec::new(),
			rating: 0.0,
			completed_orders: 0,
			active: true,
			current_order_id: None,
			created_at: now,
			updated_at: now,
		}
	}

	pub fn completed_orders(&self) -> u64 {
		self.completed_orders
	}

	pub fn current_order_id(&self) -> Option<&str> {
		self.current_order_id.as_deref()
	}

	pub fn is_busy(&self) -> bool {
		self.current_order_id.is_some()
	}

	/// Whether this contractor serves `category`.
	///
	/// An empty category set matches everything: profiles that have not
	/// finished onboarding still surface in searches.
	pub fn serves(&self, category: &str) -> bool {
		self.categories.is_empty() || self.categories.iter().any(|c| c == category)
	}

	/// Marks the contractor busy with `order_id`.
	pub fn assign(&mut self, order_id: impl Into<String>, now: DateTime<Utc>) {
		self.current_order_id = Some(order_id.into());
		self.updated_at = now;
	}

	/// Clears the assignment if it points at `order_id`.
	///
	/// Returns whether the assignment was cleared.
	pub fn release(&mut self, order_id: &str, now: DateTime<Utc>) -> bool {
		if self.current_order_id.as_deref() == Some(order_id) {
			self.current_order_id = None;
			self.updated_at = now;
			true
		} else {
			false
		}
	}

	/// Counts one more completed order.
	pub fn record_completion(&mut self, now: DateTime<Utc>) {
		self.completed_orders += 1;
		self.updated_at = now;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn profile(categories: &[&str]) -> ContractorProfile {
		let mut p = ContractorProfile::new(1, "42", Utc::now());
		p.categories = categories.iter().map(|c| c.to_string()).collect();
		p
	}

	#[test]
	fn test_empty_categories_serve_everything() {
		let p = profile(&[]);
		assert!(p.serves("comfort"));
	}

	#[test]
	fn test_release_only_clears_matching_order() {
		let mut p = profile(&["comfort"]);
		assert!(p.serves("comfort"));
		assert!(!p.serves("premium"));

		p.assign("order-1", Utc::now());
		assert!(p.is_busy());
		assert_eq!(p.current_order_id(), Some("order-1"));

		assert!(!p.release("order-2", Utc::now()));
		assert!(p.is_busy());
		assert!(p.release("order-1", Utc::now()));
		assert!(!p.is_busy());
	}

	#[test]
	fn test_role_round_trip_through_str() {
		assert_eq!("contractor".parse::<Role>().unwrap(), Role::Contractor);
		assert_eq!(Role::Client.to_string(), "client");
		assert!("Client".parse::<Role>().is_err());
	}

	#[test]
	fn test_profile_without_private_fields_deserializes() {
		let json = r#"{
			"seq": 3,
			"user_id": "7",
			"experience_years": 5,
			"active": true,
			"created_at": "2024-01-01T00:00:00Z",
			"updated_at": "2024-01-01T00:00:00Z"
		}"#;
		let p: ContractorProfile = serde_json::from_str(json).unwrap();
		assert!(p.categories.is_empty());
		assert_eq!(p.completed_orders(), 0);
		assert!(p.current_order_id().is_none());
	}
}
