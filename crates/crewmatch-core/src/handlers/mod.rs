//! Request handlers.
//!
//! This module contains the write paths of the engine: the order lifecycle
//! (create, accept, start, complete, cancel and the order listings) and the
//! user directory (users and contractor profiles). Both use optimistic
//! concurrency: read versioned records, decide, then commit one conditional
//! batch, re-running the whole attempt when another writer got in between.

pub mod directory;
pub mod order;

pub use directory::Directory;
pub use order::OrderLifecycle;

use crate::LifecycleError;
use crewmatch_storage::StorageError;
use std::future::Future;

/// Maps a commit result to "applied" (`true`) or "lost a race" (`false`).
pub(crate) fn committed(result: Result<(), StorageError>) -> Result<bool, LifecycleError> {
	match result {
		Ok(()) => Ok(true),
		Err(StorageError::Conflict { key }) => {
			tracing::debug!(key = %key, "Conditional write lost, re-evaluating");
			Ok(false)
		},
		Err(e) => {
			tracing::error!(error = %e, "Storage commit failed");
			Err(e.into())
		},
	}
}

/// Runs `attempt` until it returns `Some`, at most `max_attempts` times.
///
/// `None` means the attempt lost a conditional write; each retry re-reads
/// state, so a precondition broken by the competing writer surfaces as its
/// own domain error on the next round.
pub(crate) async fn retry_on_conflict<T, F, Fut>(
	operation: &str,
	max_attempts: u32,
	mut attempt: F,
) -> Result<T, LifecycleError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Option<T>, LifecycleError>>,
{
	for round in 1..=max_attempts.max(1) {
		if let Some(value) = attempt().await? {
			return Ok(value);
		}
		tracing::debug!(operation, round, "Retrying after concurrent modification");
	}
	tracing::warn!(operation, max_attempts, "Giving up after repeated conflicts");
	Err(LifecycleError::Contention(operation.to_string()))
}
