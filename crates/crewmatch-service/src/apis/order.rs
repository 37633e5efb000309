//! Order endpoints: creation, lookup and the lifecycle transitions.

use crewmatch_core::MatchEngine;
use crewmatch_types::{
	APIError, AcceptOrderRequest, CancelOrderResponse, CreateOrderRequest, OrderResponse,
};
use uuid::Uuid;

/// Rejects ids that cannot have been issued by `create`.
pub fn validate_order_id(order_id: &str) -> Result<(), APIError> {
	if Uuid::parse_str(order_id).is_err() {
		return Err(APIError::bad_request(
			"INVALID_ORDER_ID",
			format!("Order ID must be a valid UUID: {}", order_id),
		));
	}
	Ok(())
}

pub async fn create_order(
	engine: &MatchEngine,
	request: CreateOrderRequest,
) -> Result<OrderResponse, APIError> {
	let order = engine.orders().create(request).await?;
	Ok(OrderResponse { order })
}

pub async fn get_order(engine: &MatchEngine, order_id: &str) -> Result<OrderResponse, APIError> {
	validate_order_id(order_id)?;
	let order = engine.orders().get(order_id).await?;
	Ok(OrderResponse { order })
}

pub async fn accept_order(
	engine: &MatchEngine,
	order_id: &str,
	request: AcceptOrderRequest,
) -> Result<OrderResponse, APIError> {
	validate_order_id(order_id)?;
	let contractor_id = request.contractor_id.trim();
	if contractor_id.is_empty() {
		return Err(APIError::bad_request(
			"INVALID_REQUEST",
			"contractor_id cannot be empty",
		));
	}
	let order = engine.orders().accept(order_id, contractor_id).await?;
	Ok(OrderResponse { order })
}

pub async fn start_order(engine: &MatchEngine, order_id: &str) -> Result<OrderResponse, APIError> {
	validate_order_id(order_id)?;
	let order = engine.orders().start(order_id).await?;
	Ok(OrderResponse { order })
}

pub async fn complete_order(
	engine: &MatchEngine,
	order_id: &str,
) -> Result<OrderResponse, APIError> {
	validate_order_id(order_id)?;
	let order = engine.orders().complete(order_id).await?;
	Ok(OrderResponse { order })
}

pub async fn cancel_order(
	engine: &MatchEngine,
	order_id: &str,
) -> Result<CancelOrderResponse, APIError> {
	validate_order_id(order_id)?;
	engine.orders().cancel(order_id).await?;
	Ok(CancelOrderResponse { success: true })
}
