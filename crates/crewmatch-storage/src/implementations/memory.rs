//! Volatile backend: an ordered map behind one async lock.

use crate::{ConditionalWrite, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use crewmatch_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Records kept in process memory; everything is lost on restart.
///
/// Keys are ordered so prefix scans are range reads.
#[derive(Default)]
pub struct MemoryStorage {
	records: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.records
			.read()
			.await
			.get(key)
			.cloned()
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.records.write().await.insert(key.to_owned(), value);
		Ok(())
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let records = self.records.read().await;
		Ok(records
			.range(prefix.to_string()..)
			.take_while(|(key, _)| key.starts_with(prefix))
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect())
	}

	async fn commit(&self, batch: Vec<ConditionalWrite>) -> Result<(), StorageError> {
		// Check and apply under one write guard.
		let mut records = self.records.write().await;
		if let Some(failed) = batch
			.iter()
			.find(|w| !w.expect.holds(records.get(&w.key).map(Vec::as_slice)))
		{
			return Err(StorageError::Conflict {
				key: failed.key.clone(),
			});
		}
		records.extend(batch.into_iter().map(|w| (w.key, w.value)));
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Accepts any table; the backend takes no settings.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Builds an empty [`MemoryStorage`]; `[storage.implementations.memory]`
/// has no keys.
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
