//! HTTP server for the crewmatch API.
//!
//! Builds the axum router over a shared [`MatchEngine`] and serves it on the
//! configured address. Handlers here only extract input, delegate to
//! `crate::apis` and log rejected calls.

use axum::{
	extract::{DefaultBodyLimit, Path, Query, State},
	http::{HeaderName, HeaderValue, Method, StatusCode},
	response::Json,
	routing::{get, post},
	Router,
};
use crewmatch_config::{ApiConfig, CorsConfig};
use crewmatch_core::MatchEngine;
use crewmatch_types::{
	APIError, AcceptOrderRequest, CancelOrderResponse, CatalogResponse, ContractorOrdersResponse,
	CreateOrderRequest, OrderResponse, OrdersResponse, ProfileResponse, SearchQuery, SearchResponse,
	UpsertProfileRequest, UpsertUserRequest, UserResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Engine serving every request.
	pub engine: Arc<MatchEngine>,
}

/// Builds the `/api` router with CORS, body limit and request timeout.
pub fn build_router(api_config: &ApiConfig, engine: Arc<MatchEngine>) -> Router {
	let routes = Router::new()
		.route("/health", get(handle_health))
		.route("/categories", get(handle_categories))
		.route("/users", post(handle_upsert_user))
		.route("/users/{id}", get(handle_get_user))
		.route("/contractors/profile", post(handle_upsert_profile))
		.route("/contractors/search", get(handle_search))
		.route("/contractors/{id}/orders", get(handle_contractor_orders))
		.route(
			"/contractors/{id}/pending-orders",
			get(handle_pending_orders),
		)
		.route("/clients/{id}/orders", get(handle_client_orders))
		.route("/orders", post(handle_create_order))
		.route("/orders/{id}", get(handle_get_order))
		.route("/orders/{id}/accept", post(handle_accept_order))
		.route("/orders/{id}/start", post(handle_start_order))
		.route("/orders/{id}/complete", post(handle_complete_order))
		.route("/orders/{id}/cancel", post(handle_cancel_order));

	Router::new()
		.nest("/api", routes)
		.layer(
			ServiceBuilder::new()
				.layer(cors_layer(api_config.cors.as_ref()))
				.layer(TimeoutLayer::with_status_code(
					StatusCode::REQUEST_TIMEOUT,
					Duration::from_secs(api_config.timeout_seconds),
				))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(AppState { engine })
}

fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let mut layer = CorsLayer::new();
	layer = if cors.allowed_origins.iter().any(|o| o == "*") {
		layer.allow_origin(Any)
	} else {
		let origins: Vec<HeaderValue> = cors
			.allowed_origins
			.iter()
			.filter_map(|o| match o.parse() {
				Ok(origin) => Some(origin),
				Err(_) => {
					tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
					None
				},
			})
			.collect();
		layer.allow_origin(AllowOrigin::list(origins))
	};
	layer = if cors.allowed_methods.is_empty() {
		layer.allow_methods(Any)
	} else {
		let methods: Vec<Method> = cors
			.allowed_methods
			.iter()
			.filter_map(|m| m.to_uppercase().parse().ok())
			.collect();
		layer.allow_methods(methods)
	};
	if cors.allowed_headers.is_empty() {
		layer.allow_headers(Any)
	} else {
		let headers: Vec<HeaderName> = cors
			.allowed_headers
			.iter()
			.filter_map(|h| h.parse().ok())
			.collect();
		layer.allow_headers(headers)
	}
}

/// Starts the HTTP server for the API and runs until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<MatchEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = build_router(&api_config, engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!(address = %bind_address, "Crewmatch API server starting");

	axum::serve(listener, app).await?;

	Ok(())
}

/// Logs a rejected call at a level matching its cause.
fn rejected<T>(operation: &str, result: Result<T, APIError>) -> Result<T, APIError> {
	if let Err(e) = &result {
		if e.status_code() >= 500 {
			tracing::error!(operation, error = %e, "Request failed");
		} else {
			tracing::warn!(operation, error = %e, "Request rejected");
		}
	}
	result
}

async fn handle_health() -> Json<serde_json::Value> {
	Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_categories(State(state): State<AppState>) -> Json<CatalogResponse> {
	Json(crate::apis::catalog::categories(&state.engine))
}

async fn handle_upsert_user(
	State(state): State<AppState>,
	Json(request): Json<UpsertUserRequest>,
) -> Result<Json<UserResponse>, APIError> {
	rejected(
		"upsert_user",
		crate::apis::user::upsert_user(&state.engine, request).await,
	)
	.map(Json)
}

async fn handle_get_user(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<UserResponse>, APIError> {
	rejected(
		"get_user",
		crate::apis::user::get_user(&state.engine, &id).await,
	)
	.map(Json)
}

async fn handle_upsert_profile(
	State(state): State<AppState>,
	Json(request): Json<UpsertProfileRequest>,
) -> Result<Json<ProfileResponse>, APIError> {
	rejected(
		"upsert_profile",
		crate::apis::contractor::upsert_profile(&state.engine, request).await,
	)
	.map(Json)
}

async fn handle_search(
	Query(query): Query<SearchQuery>,
	State(state): State<AppState>,
) -> Result<Json<SearchResponse>, APIError> {
	rejected(
		"search",
		crate::apis::contractor::search(&state.engine, query).await,
	)
	.map(Json)
}

async fn handle_contractor_orders(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<ContractorOrdersResponse>, APIError> {
	rejected(
		"contractor_orders",
		crate::apis::contractor::orders(&state.engine, &id).await,
	)
	.map(Json)
}

async fn handle_pending_orders(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<ContractorOrdersResponse>, APIError> {
	rejected(
		"pending_orders",
		crate::apis::contractor::pending_orders(&state.engine, &id).await,
	)
	.map(Json)
}

async fn handle_client_orders(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrdersResponse>, APIError> {
	rejected(
		"client_orders",
		crate::apis::user::client_orders(&state.engine, &id).await,
	)
	.map(Json)
}

async fn handle_create_order(
	State(state): State<AppState>,
	Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), APIError> {
	rejected(
		"create_order",
		crate::apis::order::create_order(&state.engine, request).await,
	)
	.map(|response| (StatusCode::CREATED, Json(response)))
}

async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	rejected(
		"get_order",
		crate::apis::order::get_order(&state.engine, &id).await,
	)
	.map(Json)
}

async fn handle_accept_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<AcceptOrderRequest>,
) -> Result<Json<OrderResponse>, APIError> {
	rejected(
		"accept_order",
		crate::apis::order::accept_order(&state.engine, &id, request).await,
	)
	.map(Json)
}

async fn handle_start_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	rejected(
		"start_order",
		crate::apis::order::start_order(&state.engine, &id).await,
	)
	.map(Json)
}

async fn handle_complete_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	rejected(
		"complete_order",
		crate::apis::order::complete_order(&state.engine, &id).await,
	)
	.map(Json)
}

async fn handle_cancel_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<CancelOrderResponse>, APIError> {
	rejected(
		"cancel_order",
		crate::apis::order::cancel_order(&state.engine, &id).await,
	)
	.map(Json)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use crewmatch_config::builders::config::ConfigBuilder;
	use crewmatch_storage::implementations::memory::MemoryStorage;
	use crewmatch_storage::StorageService;
	use serde_json::{json, Value};
	use tower::ServiceExt;

	fn api_config() -> ApiConfig {
		ApiConfig {
			enabled: true,
			host: "127.0.0.1".into(),
			port: 0,
			timeout_seconds: 5,
			max_request_size: 64 * 1024,
			cors: None,
		}
	}

	fn router() -> Router {
		let config = ConfigBuilder::new()
			.category("premium", "Premium", false)
			.build();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		build_router(&api_config(), Arc::new(MatchEngine::new(config, storage)))
	}

	async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
		let request = Request::builder()
			.method(method)
			.uri(uri)
			.header("content-type", "application/json")
			.body(match body {
				Some(b) => Body::from(b.to_string()),
				None => Body::empty(),
			})
			.unwrap();
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let value = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap_or(Value::Null)
		};
		(status, value)
	}

	async fn seed(app: &Router) {
		for (id, role) in [("c1", "client"), ("a", "contractor"), ("b", "contractor")] {
			let (status, _) = call(
				app,
				"POST",
				"/api/users",
				Some(json!({ "id": id, "role": role, "name": format!("User {}", id) })),
			)
			.await;
			assert_eq!(status, StatusCode::OK);
		}
		for id in ["a", "b"] {
			let (status, _) = call(
				app,
				"POST",
				"/api/contractors/profile",
				Some(json!({ "user_id": id, "experience_years": 2, "categories": ["comfort"] })),
			)
			.await;
			assert_eq!(status, StatusCode::OK);
		}
	}

	#[tokio::test]
	async fn test_health_and_catalog() {
		let app = router();
		let (status, body) = call(&app, "GET", "/api/health", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "ok");

		let (status, body) = call(&app, "GET", "/api/categories", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["categories"]["business"]["is_addon"], true);
		assert_eq!(body["categories"]["comfort"]["price_range"]["min"], 550);
	}

	#[tokio::test]
	async fn test_order_flow_over_http() {
		let app = router();
		seed(&app).await;

		let (status, body) = call(
			&app,
			"POST",
			"/api/orders",
			Some(json!({ "client_id": "c1", "category": "comfort", "quantity": 50, "location": "Lenina 1" })),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(body["order"]["status"], "pending");
		let id = body["order"]["id"].as_str().unwrap().to_string();

		let (status, body) = call(&app, "GET", "/api/contractors/search?category=comfort", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["contractors"].as_array().unwrap().len(), 2);
		assert_eq!(body["contractors"][0]["name"], "User a");

		let (status, body) = call(
			&app,
			"POST",
			&format!("/api/orders/{}/accept", id),
			Some(json!({ "contractor_id": "a" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["order"]["contractor_id"], "a");

		let (status, body) = call(
			&app,
			"POST",
			&format!("/api/orders/{}/accept", id),
			Some(json!({ "contractor_id": "b" })),
		)
		.await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["error"], "ORDER_NOT_PENDING");

		let (_, body) = call(&app, "GET", "/api/contractors/search?category=comfort", None).await;
		assert_eq!(body["contractors"].as_array().unwrap().len(), 1);

		let (status, body) = call(&app, "POST", &format!("/api/orders/{}/complete", id), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["order"]["status"], "completed");

		let (status, body) = call(&app, "GET", "/api/users/a", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["profile"]["completed_orders"], 1);
		assert_eq!(body["profile"]["current_order_id"], Value::Null);

		let (status, body) = call(&app, "POST", &format!("/api/orders/{}/cancel", id), None).await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["error"], "ORDER_TERMINAL");

		let (status, body) = call(&app, "GET", "/api/clients/c1/orders", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["orders"].as_array().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_error_mapping() {
		let app = router();
		seed(&app).await;

		let (status, body) = call(&app, "GET", "/api/orders/not-a-uuid", None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "INVALID_ORDER_ID");

		let missing = uuid::Uuid::new_v4();
		let (status, body) = call(&app, "GET", &format!("/api/orders/{}", missing), None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "ORDER_NOT_FOUND");

		let (status, body) = call(
			&app,
			"POST",
			"/api/orders",
			Some(json!({ "client_id": "c1", "category": "business", "quantity": 10 })),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "UNKNOWN_CATEGORY");

		let (status, body) = call(
			&app,
			"POST",
			"/api/orders",
			Some(json!({ "client_id": "a", "category": "comfort", "quantity": 10 })),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "INVALID_ROLE");

		let (status, body) = call(&app, "GET", "/api/contractors/search?category=", None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "MISSING_CATEGORY");

		let (status, body) = call(&app, "GET", "/api/contractors/search?category=marble", None).await;
		assert_eq!(status, StatusCode::OK);
		assert!(body["contractors"].as_array().unwrap().is_empty());

		let (status, body) = call(&app, "GET", "/api/users/nobody", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "USER_NOT_FOUND");

		let (status, body) = call(&app, "GET", "/api/contractors/c1/orders", None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "INVALID_ROLE");
	}

	#[tokio::test]
	async fn test_pending_orders_for_contractor() {
		let app = router();
		seed(&app).await;
		for category in ["comfort", "premium"] {
			call(
				&app,
				"POST",
				"/api/orders",
				Some(json!({ "client_id": "c1", "category": category, "quantity": 10 })),
			)
			.await;
		}

		let (status, body) = call(&app, "GET", "/api/contractors/a/pending-orders", None).await;
		assert_eq!(status, StatusCode::OK);
		let orders = body["orders"].as_array().unwrap();
		assert_eq!(orders.len(), 1);
		assert_eq!(orders[0]["category"], "comfort");
		assert_eq!(orders[0]["status"], "pending");
		assert_eq!(orders[0]["client_name"], "User c1");
		assert!(orders[0]["client_phone"].is_null());
	}

	#[test]
	fn test_cors_layer_from_config() {
		let cors = CorsConfig {
			allowed_origins: vec!["https://crew.example".into(), "not a header\n".into()],
			allowed_headers: vec!["content-type".into()],
			allowed_methods: vec!["get".into(), "post".into()],
		};
		// Invalid entries are skipped rather than failing startup.
		let _layer = cors_layer(Some(&cors));
		let _permissive = cors_layer(None);
	}
}
