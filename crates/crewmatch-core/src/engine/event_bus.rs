//! Event bus for lifecycle notifications.
//!
//! A thin wrapper over a tokio broadcast channel. Publishing never blocks and
//! never fails the operation that published: with no subscribers the event
//! is dropped, and slow subscribers observe `Lagged` instead of stalling
//! writers.

use crewmatch_types::LifecycleEvent;
use tokio::sync::broadcast;

/// Broadcast channel carrying [`LifecycleEvent`]s to any number of listeners.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
	/// Creates a bus that buffers up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.sender.subscribe()
	}

	/// Sends `event` to every current subscriber.
	///
	/// Returns the number of receivers, or the event back when nobody listens.
	pub fn publish(
		&self,
		event: LifecycleEvent,
	) -> Result<usize, broadcast::error::SendError<LifecycleEvent>> {
		self.sender.send(event)
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}
