//! Catalog endpoint.

use crewmatch_core::MatchEngine;
use crewmatch_types::CatalogResponse;

/// Every catalog entry, addons included.
pub fn categories(engine: &MatchEngine) -> CatalogResponse {
	CatalogResponse {
		categories: engine.catalog().entries().clone(),
	}
}
