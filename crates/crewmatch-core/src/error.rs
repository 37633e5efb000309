//! Error taxonomy of the lifecycle engine.
//!
//! Every failure an operation can report is a [`LifecycleError`]. Each one
//! belongs to exactly one [`ErrorKind`], which is what callers branch on: a
//! `StateConflict` on accept means someone else got there first and the
//! caller should re-query instead of retrying the same call.

use crewmatch_storage::StorageError;
use crewmatch_types::{APIError, OrderStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Coarse classification of a [`LifecycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Bad input shape or values.
	Validation,
	/// Illegal transition from the current state, including lost races.
	StateConflict,
	/// A referenced entity does not exist.
	NotFound,
	/// Storage unavailable or failing.
	DependencyFailure,
}

/// Errors returned by lifecycle, directory and matching operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
	#[error("Invalid role for user {user_id}: {reason}")]
	InvalidRole { user_id: String, reason: String },
	#[error("Unknown category: {0}")]
	UnknownCategory(String),
	#[error("Quantity must be greater than zero, got {0}")]
	InvalidQuantity(Decimal),
	#[error("Invalid {field}: {message}")]
	InvalidField {
		field: &'static str,
		message: String,
	},
	#[error("Order {order_id} is {status}, not pending")]
	OrderNotPending {
		order_id: String,
		status: OrderStatus,
	},
	#[error("Contractor {contractor_id} is not available: {reason}")]
	ContractorUnavailable {
		contractor_id: String,
		reason: &'static str,
	},
	#[error("Order {order_id} is {status}, not accepted or in progress")]
	OrderNotActive {
		order_id: String,
		status: OrderStatus,
	},
	#[error("Order {order_id} is {status}, not accepted")]
	OrderNotAccepted {
		order_id: String,
		status: OrderStatus,
	},
	#[error("Order {order_id} is already {status}")]
	OrderTerminal {
		order_id: String,
		status: OrderStatus,
	},
	#[error("{entity} {id} not found")]
	NotFound { entity: &'static str, id: String },
	#[error("Gave up on {0} after repeated concurrent modifications")]
	Contention(String),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl LifecycleError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			LifecycleError::InvalidRole { .. }
			| LifecycleError::UnknownCategory(_)
			| LifecycleError::InvalidQuantity(_)
			| LifecycleError::InvalidField { .. } => ErrorKind::Validation,
			LifecycleError::OrderNotPending { .. }
			| LifecycleError::ContractorUnavailable { .. }
			| LifecycleError::OrderNotActive { .. }
			| LifecycleError::OrderNotAccepted { .. }
			| LifecycleError::OrderTerminal { .. }
			| LifecycleError::Contention(_) => ErrorKind::StateConflict,
			LifecycleError::NotFound { .. } => ErrorKind::NotFound,
			LifecycleError::Storage(_) => ErrorKind::DependencyFailure,
		}
	}

	/// Stable machine-readable code used in API error bodies.
	pub fn code(&self) -> &'static str {
		match self {
			LifecycleError::InvalidRole { .. } => "INVALID_ROLE",
			LifecycleError::UnknownCategory(_) => "UNKNOWN_CATEGORY",
			LifecycleError::InvalidQuantity(_) => "INVALID_QUANTITY",
			LifecycleError::InvalidField { .. } => "INVALID_REQUEST",
			LifecycleError::OrderNotPending { .. } => "ORDER_NOT_PENDING",
			LifecycleError::ContractorUnavailable { .. } => "CONTRACTOR_UNAVAILABLE",
			LifecycleError::OrderNotActive { .. } => "ORDER_NOT_ACTIVE",
			LifecycleError::OrderNotAccepted { .. } => "ORDER_NOT_ACCEPTED",
			LifecycleError::OrderTerminal { .. } => "ORDER_TERMINAL",
			LifecycleError::NotFound { entity: "Order", .. } => "ORDER_NOT_FOUND",
			LifecycleError::NotFound { entity: "User", .. } => "USER_NOT_FOUND",
			LifecycleError::NotFound { .. } => "NOT_FOUND",
			LifecycleError::Contention(_) => "CONTENTION",
			LifecycleError::Storage(_) => "STORAGE_UNAVAILABLE",
		}
	}

	pub(crate) fn order_not_found(order_id: &str) -> Self {
		LifecycleError::NotFound {
			entity: "Order",
			id: order_id.to_string(),
		}
	}

	pub(crate) fn user_not_found(user_id: &str) -> Self {
		LifecycleError::NotFound {
			entity: "User",
			id: user_id.to_string(),
		}
	}
}

impl From<LifecycleError> for APIError {
	fn from(err: LifecycleError) -> Self {
		let error_type = err.code().to_string();
		let message = err.to_string();
		match err.kind() {
			ErrorKind::Validation => APIError::BadRequest {
				error_type,
				message,
				details: None,
			},
			ErrorKind::StateConflict => APIError::Conflict {
				error_type,
				message,
			},
			ErrorKind::NotFound => APIError::NotFound {
				error_type,
				message,
			},
			ErrorKind::DependencyFailure => APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after: Some(1),
			},
		}
	}
}
