//! User endpoints.

use crewmatch_core::MatchEngine;
use crewmatch_types::{APIError, OrdersResponse, UpsertUserRequest, UserResponse};

pub async fn get_user(engine: &MatchEngine, user_id: &str) -> Result<UserResponse, APIError> {
	let (user, profile) = engine.directory().get_user(user_id).await?;
	Ok(UserResponse { user, profile })
}

pub async fn upsert_user(
	engine: &MatchEngine,
	request: UpsertUserRequest,
) -> Result<UserResponse, APIError> {
	let user = engine.directory().upsert_user(request).await?;
	let (user, profile) = engine.directory().get_user(&user.id).await?;
	Ok(UserResponse { user, profile })
}

/// Orders requested by a client.
pub async fn client_orders(
	engine: &MatchEngine,
	user_id: &str,
) -> Result<OrdersResponse, APIError> {
	let orders = engine.orders().orders_for_client(user_id).await?;
	Ok(OrdersResponse { orders })
}
