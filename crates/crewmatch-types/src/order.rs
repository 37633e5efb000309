//! Order types for the crewmatch system.
//!
//! An order is one unit of requested work. It is owned by a client, optionally
//! assigned to a contractor, and only ever changes through status transitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit of requested work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier (UUID v4).
	pub id: String,
	/// External id of the requesting client.
	pub client_id: String,
	/// Catalog code of the ordered category.
	pub category: String,
	/// Quantity measure, e.g. area in square metres.
	pub quantity: Decimal,
	/// Free-form location text.
	pub location: Option<String>,
	/// Current status of the order.
	pub status: OrderStatus,
	/// External id of the assigned contractor.
	pub contractor_id: Option<String>,
	pub created_at: DateTime<Utc>,
	pub accepted_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
	/// Timestamp of the last transition.
	pub updated_at: DateTime<Utc>,
}

/// Status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Waiting for a contractor.
	Pending,
	/// A contractor took the order.
	Accepted,
	/// Work has explicitly started.
	InProgress,
	/// Work is done. Terminal.
	Completed,
	/// Withdrawn by either party. Terminal.
	Cancelled,
}

impl OrderStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Accepted => "accepted",
			OrderStatus::InProgress => "in_progress",
			OrderStatus::Completed => "completed",
			OrderStatus::Cancelled => "cancelled",
		}
	}

	/// No transition leaves a terminal status.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
	}

	/// Statuses during which the assigned contractor is busy.
	pub fn holds_contractor(&self) -> bool {
		matches!(self, OrderStatus::Accepted | OrderStatus::InProgress)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
