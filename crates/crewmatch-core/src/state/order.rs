//! Order state machine.
//!
//! Orders move `pending -> accepted -> in_progress -> completed`, with
//! `cancelled` reachable from every non-terminal state. `completed` and
//! `cancelled` are terminal. Every status change goes through
//! [`OrderStateMachine::transition`], which also stamps the timestamps that
//! belong to the new status.

use crate::LifecycleError;
use chrono::{DateTime, Utc};
use crewmatch_types::{Order, OrderStatus};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Static transition table - each state maps to allowed next states
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	use OrderStatus::*;

	let mut m = HashMap::new();
	m.insert(Pending, HashSet::from([Accepted, Cancelled]));
	m.insert(Accepted, HashSet::from([InProgress, Completed, Cancelled]));
	m.insert(InProgress, HashSet::from([Completed, Cancelled]));
	m.insert(Completed, HashSet::new()); // terminal
	m.insert(Cancelled, HashSet::new()); // terminal
	m
});

/// Validates and applies order status transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}

	/// Moves `order` to `to`, or explains why it cannot move.
	///
	/// The error names what the target status requires, so a lost race on
	/// accept surfaces as `OrderNotPending` rather than a generic conflict.
	pub fn transition(
		order: &mut Order,
		to: OrderStatus,
		now: DateTime<Utc>,
	) -> Result<(), LifecycleError> {
		let from = order.status;
		if !Self::is_valid_transition(from, to) {
			return Err(Self::rejection(order, to));
		}

		order.status = to;
		order.updated_at = now;
		match to {
			OrderStatus::Accepted => order.accepted_at = Some(now),
			OrderStatus::Completed => order.completed_at = Some(now),
			_ => {},
		}

		tracing::debug!(
			order_id = %order.id,
			from = %from,
			to = %to,
			"Order transitioned"
		);
		Ok(())
	}

	fn rejection(order: &Order, to: OrderStatus) -> LifecycleError {
		let order_id = order.id.clone();
		let status = order.status;
		if status.is_terminal() {
			return LifecycleError::OrderTerminal { order_id, status };
		}
		match to {
			OrderStatus::Accepted => LifecycleError::OrderNotPending { order_id, status },
			OrderStatus::InProgress => LifecycleError::OrderNotAccepted { order_id, status },
			OrderStatus::Completed => LifecycleError::OrderNotActive { order_id, status },
			// Pending is only ever an initial state; Cancelled is reachable
			// from every non-terminal state.
			OrderStatus::Pending | OrderStatus::Cancelled => {
				LifecycleError::OrderTerminal { order_id, status }
			},
		}
	}
}
