//! Event relay.
//!
//! Subscribes to the engine's event bus and logs who should be told about
//! each transition. Delivering chat messages is left to whatever consumes
//! these logs or replaces this relay.

use crewmatch_core::EventBus;
use crewmatch_types::{truncate_id, LifecycleEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Spawns the relay; it ends when the bus is dropped.
pub fn spawn_relay(event_bus: &EventBus) -> JoinHandle<usize> {
	let mut receiver = event_bus.subscribe();
	tokio::spawn(async move {
		let mut relayed = 0;
		loop {
			match receiver.recv().await {
				Ok(event) => {
					relay(&event);
					relayed += 1;
				},
				Err(RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "Event relay fell behind, notifications dropped");
				},
				Err(RecvError::Closed) => break,
			}
		}
		tracing::debug!(relayed, "Event relay stopped");
		relayed
	})
}

fn relay(event: &LifecycleEvent) {
	let recipients: Vec<String> = event.recipients().into_iter().map(truncate_id).collect();
	tracing::info!(
		event = event.kind(),
		order_id = %truncate_id(event.order_id()),
		recipients = ?recipients,
		"Notify"
	);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_relay_drains_until_bus_closes() {
		let bus = EventBus::new(8);
		let handle = spawn_relay(&bus);

		bus.publish(LifecycleEvent::OrderCreated {
			order_id: "o1".into(),
			client_id: "c1".into(),
			category: "comfort".into(),
		})
		.unwrap();
		bus.publish(LifecycleEvent::OrderCancelled {
			order_id: "o1".into(),
			client_id: "c1".into(),
			contractor_id: None,
		})
		.unwrap();
		drop(bus);

		assert_eq!(handle.await.unwrap(), 2);
	}
}
