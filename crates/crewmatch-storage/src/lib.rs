//! Storage module for the crewmatch system.
//!
//! This module provides the entity store: a byte-oriented backend trait with
//! atomic conditional batches, and a typed facade that the lifecycle engine
//! uses for optimistic concurrency. Backends are pluggable; an in-memory and a
//! file-based implementation ship with the crate.

use async_trait::async_trait;
use crewmatch_types::{ConfigSchema, ImplementationRegistry, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Bundled backends.
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Failures of the entity store.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	/// A conditional write found the record in a different state than expected.
	/// Nothing from the batch was written.
	#[error("Conflicting write on key '{key}'")]
	Conflict { key: String },
	/// A record could not be encoded or a stored record could not be decoded.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The medium failed (disk, lock file, ...).
	#[error("Backend error: {0}")]
	Backend(String),
	/// The backend table was rejected at construction.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Precondition a record must satisfy for a batch to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
	/// The key must not exist yet.
	Absent,
	/// The key must still hold exactly these bytes.
	Unchanged(Vec<u8>),
}

impl Expectation {
	/// Whether `current` satisfies this expectation.
	pub fn holds(&self, current: Option<&[u8]>) -> bool {
		match self {
			Expectation::Absent => current.is_none(),
			Expectation::Unchanged(expected) => current == Some(expected.as_slice()),
		}
	}
}

/// One write of an atomic batch.
#[derive(Debug, Clone)]
pub struct ConditionalWrite {
	pub key: String,
	pub expect: Expectation,
	pub value: Vec<u8>,
}

/// Byte-level contract of a storage backend.
///
/// Besides plain key-value access a backend provides
/// [`StorageInterface::commit`], which applies a batch of conditional writes
/// all-or-nothing.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Raw record at `key`, or [`StorageError::NotFound`].
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes unconditionally.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Returns every `(key, value)` pair whose key starts with `prefix`,
	/// ordered by key.
	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

	/// Applies `batch` atomically.
	///
	/// Every expectation is checked first. If one fails, the batch is rejected
	/// with [`StorageError::Conflict`] and no write lands. Concurrent readers
	/// never observe a partially applied batch.
	async fn commit(&self, batch: Vec<ConditionalWrite>) -> Result<(), StorageError>;

	/// Schema of this backend's `[storage.implementations.<name>]` table.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Constructor of a backend from its configuration table.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Marks an [`ImplementationRegistry`] whose factory builds storage backends.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Every bundled backend as `(config name, factory)`.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

fn record_key(namespace: StorageKey, id: &str) -> String {
	format!("{}:{}", namespace.as_str(), id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// A decoded record together with the exact bytes it was read from.
///
/// The raw bytes act as the version: passing them back through
/// [`Transaction::replace`] makes the write conditional on nobody having
/// changed the record since.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
	pub value: T,
	pub raw: Vec<u8>,
}

/// Typed JSON records over a [`StorageInterface`].
///
/// Keys have the form `"{namespace}:{id}"`.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Wraps `backend`.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Writes a record without a precondition, outside any batch.
	pub async fn store<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes = encode(data)?;
		self.backend.set_bytes(&record_key(namespace, id), bytes).await
	}

	/// Retrieves a value, mapping [`StorageError::NotFound`] to `None`.
	pub async fn try_retrieve<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		Ok(self
			.try_retrieve_versioned(namespace, id)
			.await?
			.map(|v| v.value))
	}

	/// Retrieves a value along with its raw bytes.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<Versioned<T>, StorageError> {
		let raw = self.backend.get_bytes(&record_key(namespace, id)).await?;
		let value = decode(&raw)?;
		Ok(Versioned { value, raw })
	}

	/// Like [`StorageService::retrieve_versioned`], with absence as `None`.
	pub async fn try_retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<Option<Versioned<T>>, StorageError> {
		match self.retrieve_versioned(namespace, id).await {
			Ok(versioned) => Ok(Some(versioned)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Lists every record of a namespace, ordered by id.
	pub async fn list<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
	) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:", namespace.as_str());
		self.backend
			.scan_prefix(&prefix)
			.await?
			.iter()
			.map(|(_, bytes)| decode(bytes))
			.collect()
	}

	/// Starts an atomic batch of conditional writes.
	pub fn transaction(&self) -> Transaction<'_> {
		Transaction {
			service: self,
			writes: Vec::new(),
		}
	}
}

/// Builder for an all-or-nothing batch.
///
/// Nothing is written until [`Transaction::commit`]. Dropping a transaction
/// discards it.
pub struct Transaction<'a> {
	service: &'a StorageService,
	writes: Vec<ConditionalWrite>,
}

impl Transaction<'_> {
	/// Writes a record that must not exist yet.
	pub fn insert<T: Serialize>(
		&mut self,
		namespace: StorageKey,
		id: &str,
		value: &T,
	) -> Result<&mut Self, StorageError> {
		self.push(namespace, id, Expectation::Absent, value)
	}

	/// Overwrites a record that must still hold `previous`.
	pub fn replace<T: Serialize, P>(
		&mut self,
		namespace: StorageKey,
		id: &str,
		previous: &Versioned<P>,
		value: &T,
	) -> Result<&mut Self, StorageError> {
		self.push(
			namespace,
			id,
			Expectation::Unchanged(previous.raw.clone()),
			value,
		)
	}

	fn push<T: Serialize>(
		&mut self,
		namespace: StorageKey,
		id: &str,
		expect: Expectation,
		value: &T,
	) -> Result<&mut Self, StorageError> {
		self.writes.push(ConditionalWrite {
			key: record_key(namespace, id),
			expect,
			value: encode(value)?,
		});
		Ok(self)
	}

	pub fn len(&self) -> usize {
		self.writes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.writes.is_empty()
	}

	/// Applies every write of the batch, or none of them.
	pub async fn commit(self) -> Result<(), StorageError> {
		if self.writes.is_empty() {
			return Ok(());
		}
		self.service.backend.commit(self.writes).await
	}
}

#[cfg(test)]
mod tests {
	use super::implementations::memory::MemoryStorage;
	use super::*;
	use serde::Deserialize;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Record {
		name: String,
		count: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	fn record(name: &str, count: u32) -> Record {
		Record {
			name: name.to_string(),
			count,
		}
	}

	#[test]
	fn test_expectation_holds() {
		assert!(Expectation::Absent.holds(None));
		assert!(!Expectation::Absent.holds(Some(b"x")));
		assert!(Expectation::Unchanged(b"x".to_vec()).holds(Some(b"x")));
		assert!(!Expectation::Unchanged(b"x".to_vec()).holds(Some(b"y")));
		assert!(!Expectation::Unchanged(b"x".to_vec()).holds(None));
	}

	#[tokio::test]
	async fn test_store_and_retrieve() {
		let storage = service();
		storage
			.store(StorageKey::Users, "1", &record("a", 1))
			.await
			.unwrap();

		let loaded: Option<Record> = storage.try_retrieve(StorageKey::Users, "1").await.unwrap();
		assert_eq!(loaded, Some(record("a", 1)));
		let other: Option<Record> = storage.try_retrieve(StorageKey::Orders, "1").await.unwrap();
		assert!(other.is_none());

		assert!(matches!(
			storage
				.retrieve_versioned::<Record>(StorageKey::Users, "2")
				.await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_list_is_scoped_to_namespace() {
		let storage = service();
		storage
			.store(StorageKey::Users, "b", &record("b", 2))
			.await
			.unwrap();
		storage
			.store(StorageKey::Users, "a", &record("a", 1))
			.await
			.unwrap();
		storage
			.store(StorageKey::Orders, "a", &record("order", 9))
			.await
			.unwrap();

		let users: Vec<Record> = storage.list(StorageKey::Users).await.unwrap();
		assert_eq!(users, vec![record("a", 1), record("b", 2)]);
	}

	#[tokio::test]
	async fn test_replace_rejects_stale_version() {
		let storage = service();
		storage
			.store(StorageKey::Users, "1", &record("a", 1))
			.await
			.unwrap();

		let first: Versioned<Record> = storage
			.retrieve_versioned(StorageKey::Users, "1")
			.await
			.unwrap();
		let second: Versioned<Record> = storage
			.retrieve_versioned(StorageKey::Users, "1")
			.await
			.unwrap();

		let mut tx = storage.transaction();
		tx.replace(StorageKey::Users, "1", &first, &record("a", 2))
			.unwrap();
		tx.commit().await.unwrap();

		let mut tx = storage.transaction();
		tx.replace(StorageKey::Users, "1", &second, &record("a", 3))
			.unwrap();
		let err = tx.commit().await.unwrap_err();
		assert!(matches!(err, StorageError::Conflict { key } if key == "users:1"));

		let current: Versioned<Record> = storage
			.retrieve_versioned(StorageKey::Users, "1")
			.await
			.unwrap();
		assert_eq!(current.value.count, 2);
	}

	#[tokio::test]
	async fn test_failed_batch_writes_nothing() {
		let storage = service();
		storage
			.store(StorageKey::Orders, "taken", &record("x", 0))
			.await
			.unwrap();

		let mut tx = storage.transaction();
		tx.insert(StorageKey::Users, "new", &record("new", 1))
			.unwrap()
			.insert(StorageKey::Orders, "taken", &record("y", 1))
			.unwrap();
		assert_eq!(tx.len(), 2);
		assert!(tx.commit().await.is_err());

		let user: Option<Record> = storage.try_retrieve(StorageKey::Users, "new").await.unwrap();
		assert!(user.is_none());
		let order: Option<Record> = storage.try_retrieve(StorageKey::Orders, "taken").await.unwrap();
		assert_eq!(order.map(|o| o.name).as_deref(), Some("x"));
	}

	#[tokio::test]
	async fn test_empty_transaction_is_noop() {
		let storage = service();
		let tx = storage.transaction();
		assert!(tx.is_empty());
		tx.commit().await.unwrap();
	}
}
