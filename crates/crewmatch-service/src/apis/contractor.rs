//! Contractor endpoints: profile upkeep, search and order views.

use crewmatch_core::MatchEngine;
use crewmatch_types::{
	APIError, ContractorOrdersResponse, ProfileResponse, SearchQuery, SearchResponse,
	UpsertProfileRequest,
};

pub async fn upsert_profile(
	engine: &MatchEngine,
	request: UpsertProfileRequest,
) -> Result<ProfileResponse, APIError> {
	let profile = engine.directory().upsert_profile(request).await?;
	Ok(ProfileResponse { profile })
}

/// Ranked search; a missing or blank category is a client error.
pub async fn search(engine: &MatchEngine, query: SearchQuery) -> Result<SearchResponse, APIError> {
	let category = query
		.category
		.as_deref()
		.map(str::trim)
		.filter(|c| !c.is_empty())
		.ok_or_else(|| APIError::bad_request("MISSING_CATEGORY", "category is required"))?;

	let contractors = engine.matching().search(category).await?;
	Ok(SearchResponse { contractors })
}

pub async fn orders(
	engine: &MatchEngine,
	user_id: &str,
) -> Result<ContractorOrdersResponse, APIError> {
	let orders = engine.orders().orders_for_contractor(user_id).await?;
	Ok(ContractorOrdersResponse { orders })
}

pub async fn pending_orders(
	engine: &MatchEngine,
	user_id: &str,
) -> Result<ContractorOrdersResponse, APIError> {
	let orders = engine.orders().pending_for_contractor(user_id).await?;
	Ok(ContractorOrdersResponse { orders })
}
