//! API types for the crewmatch HTTP API.
//!
//! One canonical snake_case schema is used at the boundary; producers that
//! send other casings are expected to normalize before calling us.

use crate::{CategoryEntry, ContractorProfile, Order, Role, User};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Create-or-patch payload for a user.
///
/// On creation `role` is required. On later calls only the fields that are
/// present are changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertUserRequest {
	/// External identity.
	pub id: String,
	pub role: Option<Role>,
	pub name: Option<String>,
	pub phone: Option<String>,
	pub avatar_url: Option<String>,
}

/// User together with the contractor profile, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
	pub user: User,
	pub profile: Option<ContractorProfile>,
}

fn default_active() -> bool {
	true
}

/// Create-or-update payload for a contractor profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertProfileRequest {
	/// External id of the contractor.
	pub user_id: String,
	pub experience_years: Option<u32>,
	#[serde(default)]
	pub categories: Vec<String>,
	#[serde(default = "default_active")]
	pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
	pub profile: ContractorProfile,
}

/// Query string of the contractor search endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
	pub category: Option<String>,
}

/// A ranked search result: the profile plus the owner's contact fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractorCandidate {
	#[serde(flatten)]
	pub profile: ContractorProfile,
	pub name: Option<String>,
	pub phone: Option<String>,
	pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
	pub contractors: Vec<ContractorCandidate>,
}

/// Payload for creating an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	/// External id of the requesting client.
	pub client_id: String,
	pub category: String,
	pub quantity: Decimal,
	pub location: Option<String>,
}

/// Payload for accepting an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptOrderRequest {
	/// External id of the accepting contractor.
	pub contractor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
	pub order: Order,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersResponse {
	pub orders: Vec<Order>,
}

/// An order in a contractor's listing, with the requesting client's contact
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractorOrder {
	#[serde(flatten)]
	pub order: Order,
	pub client_name: Option<String>,
	pub client_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractorOrdersResponse {
	pub orders: Vec<ContractorOrder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderResponse {
	pub success: bool,
}

/// The full category catalog, addons included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
	pub categories: BTreeMap<String, CategoryEntry>,
}

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Stable machine-readable code, e.g. `ORDER_NOT_PENDING`.
	pub error: String,
	pub message: String,
	pub details: Option<serde_json::Value>,
	/// Seconds before a retry is worthwhile.
	pub retry_after: Option<u64>,
}

/// An error leaving the API, one variant per HTTP status family.
#[derive(Debug)]
pub enum APIError {
	/// 400
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Referenced entity does not exist (404)
	NotFound { error_type: String, message: String },
	/// Illegal state transition or lost race (409)
	Conflict { error_type: String, message: String },
	/// 503, the store or another dependency failed
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// 500
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	pub fn bad_request(error_type: &str, message: impl Into<String>) -> Self {
		APIError::BadRequest {
			error_type: error_type.to_string(),
			message: message.into(),
			details: None,
		}
	}

	/// Body sent to the client.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details, retry_after) = match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			} => (error_type, message, details.clone(), None),
			APIError::NotFound {
				error_type,
				message,
			}
			| APIError::Conflict {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message, None, None),
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => (error_type, message, None, *retry_after),
		};
		ErrorResponse {
			error: error.clone(),
			message: message.clone(),
			details,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::ServiceUnavailable { message, .. } => {
				write!(f, "Service Unavailable: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		let status = axum::http::StatusCode::from_u16(self.status_code())
			.unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
		(status, axum::Json(self.to_error_response())).into_response()
	}
}
