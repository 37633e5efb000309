//! File-based storage backend.
//!
//! Each record lives in its own file, `<base>/<namespace>/<hex(id)>.bin`,
//! written through a temp file and a rename. Batches are first written to a
//! journal. While a journal exists no operation runs before it has been
//! replayed, so a batch interrupted by a crash or a failed write is completed
//! before anyone can observe it half applied.

use crate::{ConditionalWrite, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use crewmatch_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const JOURNAL_FILE: &str = "journal.json";
const LOCK_FILE: &str = ".lock";

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size record header.
///
/// Binary layout (8 bytes total):
/// - [0-3]: Magic bytes "CRWM"
/// - [4-5]: Version (u16, little-endian)
/// - [6-7]: Reserved
#[derive(Debug, Clone)]
struct FileHeader {
	magic: [u8; 4],
	version: u16,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"CRWM";
	const VERSION: u16 = 1;
	const SIZE: usize = 8;

	fn new() -> Self {
		Self {
			magic: *Self::MAGIC,
			version: Self::VERSION,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(&self.magic);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}

		let mut magic = [0u8; 4];
		magic.copy_from_slice(&bytes[0..4]);
		if magic != *Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized record file".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		Ok(Self { magic, version })
	}
}

/// One pending write as recorded in the journal.
#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
	key: String,
	/// Hex-encoded record bytes.
	value: String,
}

fn backend_err(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

fn frame(value: &[u8]) -> Vec<u8> {
	let mut data = Vec::with_capacity(FileHeader::SIZE + value.len());
	data.extend_from_slice(&FileHeader::new().serialize());
	data.extend_from_slice(value);
	data
}

fn unframe(data: &[u8]) -> Result<Vec<u8>, StorageError> {
	FileHeader::deserialize(data)?;
	Ok(data[FileHeader::SIZE..].to_vec())
}

fn sanitize_namespace(namespace: &str) -> String {
	namespace
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
		.collect()
}

/// File-based storage implementation.
///
/// The base directory is owned exclusively by one process for the lifetime of
/// the instance through an `fs2` lock on `<base>/.lock`. Within the process,
/// batches and plain writes take the write side of `gate` and reads the read
/// side. Either side first replays a leftover journal, and fails while the
/// journal cannot be replayed.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	gate: RwLock<()>,
	/// Held open to keep the directory lock.
	_lock: std::fs::File,
}

impl FileStorage {
	/// Opens (creating if needed) a storage directory.
	///
	/// Fails if another instance holds the directory lock. A journal left by
	/// an interrupted batch is replayed by the first operation.
	pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let base_path = base_path.into();
		std::fs::create_dir_all(&base_path).map_err(backend_err)?;

		let lock = std::fs::OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(base_path.join(LOCK_FILE))
			.map_err(backend_err)?;
		lock.try_lock_exclusive().map_err(|e| {
			StorageError::Backend(format!(
				"Storage directory {} is in use: {}",
				base_path.display(),
				e
			))
		})?;

		Ok(Self {
			base_path,
			gate: RwLock::new(()),
			_lock: lock,
		})
	}

	/// Converts a storage key to its file path.
	///
	/// The id part is hex-encoded so any id is filesystem-safe.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let (namespace, id) = key.split_once(':').unwrap_or(("_", key));
		self.base_path
			.join(sanitize_namespace(namespace))
			.join(format!("{}.bin", hex::encode(id.as_bytes())))
	}

	fn journal_path(&self) -> PathBuf {
		self.base_path.join(JOURNAL_FILE)
	}

	async fn has_journal(&self) -> Result<bool, StorageError> {
		fs::try_exists(self.journal_path())
			.await
			.map_err(backend_err)
	}

	/// Applies and removes a leftover journal. Replaying is idempotent: the
	/// journal only ever holds the latest batch.
	async fn replay_journal(&self) -> Result<(), StorageError> {
		let path = self.journal_path();
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
			Err(e) => return Err(backend_err(e)),
		};

		let entries: Vec<JournalEntry> = serde_json::from_slice(&data)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		tracing::warn!(
			writes = entries.len(),
			path = %path.display(),
			"Replaying interrupted storage batch"
		);

		for entry in &entries {
			let value = hex::decode(&entry.value).map_err(backend_err)?;
			self.write_record(&entry.key, &value).await?;
		}
		fs::remove_file(&path).await.map_err(backend_err)
	}

	/// Shared access, after any leftover journal has been replayed.
	async fn read_gate(&self) -> Result<RwLockReadGuard<'_, ()>, StorageError> {
		let guard = self.gate.read().await;
		if !self.has_journal().await? {
			return Ok(guard);
		}
		drop(guard);
		Ok(self.write_gate().await?.downgrade())
	}

	/// Exclusive access, after any leftover journal has been replayed.
	async fn write_gate(&self) -> Result<RwLockWriteGuard<'_, ()>, StorageError> {
		let guard = self.gate.write().await;
		if self.has_journal().await? {
			self.replay_journal().await.map_err(|e| {
				tracing::error!(error = %e, "Storage journal cannot be replayed");
				e
			})?;
		}
		Ok(guard)
	}

	async fn apply(&self, batch: &[ConditionalWrite]) -> Result<(), StorageError> {
		for write in batch {
			self.write_record(&write.key, &write.value).await?;
		}
		Ok(())
	}

	async fn read_record(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		read_file(&self.get_file_path(key)).await
	}

	async fn write_record(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(backend_err)?;
		}

		// Write atomically by writing to temp file then renaming
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, frame(value))
			.await
			.map_err(backend_err)?;
		fs::rename(&temp_path, &path).await.map_err(backend_err)
	}

	async fn scan_namespace(
		&self,
		dir: &Path,
		namespace: &str,
		prefix: &str,
		out: &mut Vec<(String, Vec<u8>)>,
	) -> Result<(), StorageError> {
		let mut entries = match fs::read_dir(dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
			Err(e) => return Err(backend_err(e)),
		};

		while let Some(entry) = entries.next_entry().await.map_err(backend_err)? {
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			let Some(id) = path
				.file_stem()
				.and_then(|s| s.to_str())
				.and_then(|s| hex::decode(s).ok())
				.and_then(|b| String::from_utf8(b).ok())
			else {
				tracing::debug!("Skipping unrecognized file {:?}", path);
				continue;
			};
			let key = format!("{}:{}", namespace, id);
			if !key.starts_with(prefix) {
				continue;
			}
			if let Some(value) = read_file(&path).await? {
				out.push((key, value));
			}
		}
		Ok(())
	}
}

async fn read_file(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
	match fs::read(path).await {
		Ok(data) => unframe(&data).map(Some),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(backend_err(e)),
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let _read = self.read_gate().await?;
		self.read_record(key).await?.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let _write = self.write_gate().await?;
		self.write_record(key, &value).await
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let _read = self.read_gate().await?;
		let mut out = Vec::new();

		match prefix.split_once(':') {
			Some((namespace, _)) => {
				let dir = self.base_path.join(sanitize_namespace(namespace));
				self.scan_namespace(&dir, namespace, prefix, &mut out)
					.await?;
			},
			None => {
				let mut dirs = fs::read_dir(&self.base_path).await.map_err(backend_err)?;
				while let Some(entry) = dirs.next_entry().await.map_err(backend_err)? {
					let is_dir = entry.file_type().await.map_err(backend_err)?.is_dir();
					let name = entry.file_name().to_string_lossy().into_owned();
					if is_dir && name.starts_with(prefix) {
						self.scan_namespace(&entry.path(), &name, prefix, &mut out)
							.await?;
					}
				}
			},
		}

		out.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(out)
	}

	async fn commit(&self, batch: Vec<ConditionalWrite>) -> Result<(), StorageError> {
		let _write = self.write_gate().await?;

		for write in &batch {
			let current = self.read_record(&write.key).await?;
			if !write.expect.holds(current.as_deref()) {
				return Err(StorageError::Conflict {
					key: write.key.clone(),
				});
			}
		}

		let journal: Vec<JournalEntry> = batch
			.iter()
			.map(|w| JournalEntry {
				key: w.key.clone(),
				value: hex::encode(&w.value),
			})
			.collect();
		let journal_bytes =
			serde_json::to_vec(&journal).map_err(|e| StorageError::Serialization(e.to_string()))?;
		let journal_path = self.journal_path();
		let journal_temp = journal_path.with_extension("tmp");
		fs::write(&journal_temp, journal_bytes)
			.await
			.map_err(backend_err)?;
		fs::rename(&journal_temp, &journal_path)
			.await
			.map_err(backend_err)?;

		if let Err(e) = self.apply(&batch).await {
			tracing::warn!(error = %e, "Batch write failed, retrying from the journal");
			self.apply(&batch).await.map_err(|e| {
				tracing::error!(
					error = %e,
					"Batch left in the journal; storage unavailable until it replays"
				);
				e
			})?;
		}

		// The batch is applied; a journal that cannot be removed is replayed
		// again by the next operation.
		if let Err(e) = fs::remove_file(&journal_path).await {
			tracing::warn!(error = %e, "Applied batch journal was not removed");
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(path) if path.trim().is_empty() => {
						Err("storage_path must not be empty".to_string())
					},
					_ => Ok(()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create a storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::open(storage_path)?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
