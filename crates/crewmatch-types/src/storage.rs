//! Storage-related types for the crewmatch system.

/// Storage namespaces for the different entity collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Users keyed by external id
	Users,
	/// Contractor profiles keyed by the owning user's external id
	Profiles,
	/// Orders keyed by order id
	Orders,
	/// Monotonic counters
	Sequences,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Users => "users",
			StorageKey::Profiles => "profiles",
			StorageKey::Orders => "orders",
			StorageKey::Sequences => "sequences",
		}
	}
}
