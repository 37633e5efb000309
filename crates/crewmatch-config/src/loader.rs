//! Multi-file configuration loading.
//!
//! A configuration file may pull in others with `include = "file.toml"` or
//! `include = ["a.toml", "b.toml"]`. Paths are relative to the including file,
//! and included files may include further files. Every top-level section must
//! come from exactly one file, except `catalog`, whose categories may be split
//! across files as long as no category code is defined twice.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Tables whose keys may come from different files. Everything below them,
/// such as a single category, is owned by exactly one file.
const SPLITTABLE_TABLES: &[&str] = &["catalog", "catalog.categories"];

/// Loads a configuration file together with everything it includes.
pub struct ConfigLoader {
	root: PathBuf,
	visited: HashSet<PathBuf>,
	/// Dotted key -> file that defined it.
	origins: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	/// Creates a loader resolving the entry file relative to `root`.
	pub fn new(root: impl AsRef<Path>) -> Self {
		Self {
			root: root.as_ref().to_path_buf(),
			visited: HashSet::new(),
			origins: HashMap::new(),
		}
	}

	/// Loads, merges and validates the configuration rooted at `config_path`.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let entry = locate(&self.root, config_path.as_ref())?;
		let mut merged = toml::Table::new();
		let mut pending = VecDeque::from([entry]);

		while let Some(file) = pending.pop_front() {
			let mut table = self.read_table(&file).await?;
			let base = file.parent().unwrap_or(&self.root).to_path_buf();
			for include in take_includes(&mut table)? {
				pending.push_back(locate(&base, &include)?);
			}
			for (key, value) in table {
				self.merge_entry(&mut merged, "", key, value, &file)?;
			}
		}

		let text = toml::to_string(&merged).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		text.parse()
	}

	async fn read_table(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = resolve_env_vars(&tokio::fs::read_to_string(path).await?)?;
		Ok(toml::from_str(&content)?)
	}

	fn merge_entry(
		&mut self,
		target: &mut toml::Table,
		parent: &str,
		key: String,
		value: toml::Value,
		file: &Path,
	) -> Result<(), ConfigError> {
		let dotted = if parent.is_empty() {
			key.clone()
		} else {
			format!("{}.{}", parent, key)
		};

		let Some(existing) = target.get_mut(&key) else {
			self.origins.insert(dotted, file.to_path_buf());
			target.insert(key, value);
			return Ok(());
		};

		let splittable = SPLITTABLE_TABLES.contains(&dotted.as_str());
		match (existing, value) {
			(toml::Value::Table(existing), toml::Value::Table(incoming)) if splittable => {
				for (child, child_value) in incoming {
					self.merge_entry(existing, &dotted, child, child_value, file)?;
				}
				Ok(())
			},
			_ => {
				let first = self
					.origin_of(&dotted)
					.map(|p| p.display().to_string())
					.unwrap_or_else(|| "an earlier file".into());
				Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each section must be defined in only one configuration file.",
					dotted,
					first,
					file.display()
				)))
			},
		}
	}

	/// File that defined `dotted` or its nearest defined ancestor.
	fn origin_of(&self, dotted: &str) -> Option<&PathBuf> {
		let mut key = dotted;
		loop {
			if let Some(origin) = self.origins.get(key) {
				return Some(origin);
			}
			key = &key[..key.rfind('.')?];
		}
	}
}

/// Removes and returns the `include` directive of a file.
fn take_includes(table: &mut toml::Table) -> Result<Vec<PathBuf>, ConfigError> {
	match table.remove("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("Include array must contain only strings".into())
				})
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

fn locate(base: &Path, path: &Path) -> Result<PathBuf, ConfigError> {
	let resolved = if path.is_absolute() {
		path.to_path_buf()
	} else {
		base.join(path)
	};
	if !resolved.exists() {
		return Err(ConfigError::Io(std::io::Error::new(
			std::io::ErrorKind::NotFound,
			format!("Configuration file not found: {}", resolved.display()),
		)));
	}
	Ok(resolved)
}
