//! Category catalog.
//!
//! The catalog is a static table keyed by category code. It is loaded from
//! configuration and consumed read-only. Addon entries describe surcharges on
//! top of a base category and can never be ordered on their own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors returned by catalog lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
	#[error("Unknown category: {0}")]
	Unknown(String),
	#[error("Category '{0}' is an addon and cannot be ordered on its own")]
	AddonOnly(String),
}

/// Price per unit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
	pub min: u32,
	pub max: u32,
}

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
	/// Display name.
	pub name: String,
	#[serde(default)]
	pub description: String,
	/// Price per unit range.
	pub price_range: PriceRange,
	/// Typical turnaround, free text.
	#[serde(default)]
	pub days: String,
	#[serde(default)]
	pub features: Vec<String>,
	/// Addon entries are excluded from ordering and from the selectable set.
	#[serde(default)]
	pub is_addon: bool,
}

/// Read-only table of categories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
	entries: BTreeMap<String, CategoryEntry>,
}

impl Catalog {
	pub fn new(entries: BTreeMap<String, CategoryEntry>) -> Self {
		let entries = entries
			.into_iter()
			.map(|(code, entry)| (Self::normalize_code(&code), entry))
			.collect();
		Self { entries }
	}

	/// Canonical form of a category code: trimmed and lowercased.
	pub fn normalize_code(code: &str) -> String {
		code.trim().to_lowercase()
	}

	pub fn get(&self, code: &str) -> Option<&CategoryEntry> {
		self.entries.get(&Self::normalize_code(code))
	}

	/// Looks up a category that may be ordered standalone.
	pub fn orderable(&self, code: &str) -> Result<&CategoryEntry, CatalogError> {
		let normalized = Self::normalize_code(code);
		match self.entries.get(&normalized) {
			None => Err(CatalogError::Unknown(normalized)),
			Some(entry) if entry.is_addon => Err(CatalogError::AddonOnly(normalized)),
			Some(entry) => Ok(entry),
		}
	}

	/// Non-addon entries, ordered by code.
	pub fn selectable(&self) -> impl Iterator<Item = (&String, &CategoryEntry)> {
		self.entries.iter().filter(|(_, entry)| !entry.is_addon)
	}

	pub fn entries(&self) -> &BTreeMap<String, CategoryEntry> {
		&self.entries
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
