//! Event types published on order lifecycle transitions.
//!
//! Events carry the external ids of the parties involved so that a notifier
//! outside the core can reach them. The core never delivers messages itself.

use serde::{Deserialize, Serialize};

/// A completed order transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
	/// A client created a new pending order.
	OrderCreated {
		order_id: String,
		client_id: String,
		category: String,
	},
	/// A contractor took a pending order.
	OrderAccepted {
		order_id: String,
		client_id: String,
		contractor_id: String,
	},
	/// Work on an accepted order started.
	OrderStarted {
		order_id: String,
		client_id: String,
		contractor_id: String,
	},
	/// The assigned contractor finished the order.
	OrderCompleted {
		order_id: String,
		client_id: String,
		contractor_id: Option<String>,
	},
	/// The order was withdrawn.
	OrderCancelled {
		order_id: String,
		client_id: String,
		contractor_id: Option<String>,
	},
}

impl LifecycleEvent {
	pub fn order_id(&self) -> &str {
		match self {
			LifecycleEvent::OrderCreated { order_id, .. }
			| LifecycleEvent::OrderAccepted { order_id, .. }
			| LifecycleEvent::OrderStarted { order_id, .. }
			| LifecycleEvent::OrderCompleted { order_id, .. }
			| LifecycleEvent::OrderCancelled { order_id, .. } => order_id,
		}
	}

	/// External ids that should hear about this event.
	pub fn recipients(&self) -> Vec<&str> {
		match self {
			LifecycleEvent::OrderCreated { client_id, .. } => vec![client_id.as_str()],
			LifecycleEvent::OrderAccepted {
				client_id,
				contractor_id,
				..
			}
			| LifecycleEvent::OrderStarted {
				client_id,
				contractor_id,
				..
			} => vec![client_id.as_str(), contractor_id.as_str()],
			LifecycleEvent::OrderCompleted {
				client_id,
				contractor_id,
				..
			}
			| LifecycleEvent::OrderCancelled {
				client_id,
				contractor_id,
				..
			} => {
				let mut recipients = vec![client_id.as_str()];
				if let Some(contractor) = contractor_id {
					recipients.push(contractor.as_str());
				}
				recipients
			},
		}
	}

	/// Short name used in logs.
	pub fn kind(&self) -> &'static str {
		match self {
			LifecycleEvent::OrderCreated { .. } => "order_created",
			LifecycleEvent::OrderAccepted { .. } => "order_accepted",
			LifecycleEvent::OrderStarted { .. } => "order_started",
			LifecycleEvent::OrderCompleted { .. } => "order_completed",
			LifecycleEvent::OrderCancelled { .. } => "order_cancelled",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_recipients_include_assigned_contractor() {
		let event = LifecycleEvent::OrderCancelled {
			order_id: "o1".into(),
			client_id: "c1".into(),
			contractor_id: Some("k1".into()),
		};
		assert_eq!(event.recipients(), vec!["c1", "k1"]);
		assert_eq!(event.order_id(), "o1");

		let unassigned = LifecycleEvent::OrderCancelled {
			order_id: "o2".into(),
			client_id: "c1".into(),
			contractor_id: None,
		};
		assert_eq!(unassigned.recipients(), vec!["c1"]);
	}

	#[test]
	fn test_event_is_tagged() {
		let event = LifecycleEvent::OrderCreated {
			order_id: "o1".into(),
			client_id: "c1".into(),
			category: "comfort".into(),
		};
		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(json["type"], "order_created");
		assert_eq!(event.kind(), "order_created");
	}
}
