//! Lifecycle management for the matching engine.
//!
//! Handles startup and shutdown, and provides a read-only audit of the
//! assignment invariant: a profile is busy exactly when one accepted or
//! in-progress order references its contractor.

use super::{EngineError, MatchEngine};
use crewmatch_types::{truncate_id, ContractorProfile, Order, StorageKey};
use serde::Serialize;
use std::collections::HashMap;

/// Result of [`MatchEngine::audit_assignments`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentReport {
	/// Profiles with a current order.
	pub busy_profiles: usize,
	/// Orders in `accepted` or `in_progress`.
	pub active_orders: usize,
	/// Human-readable descriptions of every violation found.
	pub inconsistencies: Vec<String>,
}

impl AssignmentReport {
	pub fn is_consistent(&self) -> bool {
		self.inconsistencies.is_empty()
	}
}

impl MatchEngine {
	/// Performs any initialization required before serving requests.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(
			service = %self.config.service.id,
			categories = self.catalog.len(),
			"Initializing match engine"
		);

		let report = self.audit_assignments().await?;
		if report.is_consistent() {
			tracing::info!(
				busy_profiles = report.busy_profiles,
				active_orders = report.active_orders,
				"Assignment state consistent"
			);
		} else {
			for issue in &report.inconsistencies {
				tracing::warn!(issue = %issue, "Assignment inconsistency");
			}
		}
		Ok(())
	}

	/// Performs cleanup operations.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!(
			subscribers = self.event_bus.subscriber_count(),
			"Shutting down match engine"
		);
		Ok(())
	}

	/// Cross-checks profiles against orders without modifying anything.
	pub async fn audit_assignments(&self) -> Result<AssignmentReport, EngineError> {
		let profiles: Vec<ContractorProfile> = self.storage.list(StorageKey::Profiles).await?;
		let orders: Vec<Order> = self.storage.list(StorageKey::Orders).await?;

		let mut holders: HashMap<&str, Vec<&Order>> = HashMap::new();
		let mut report = AssignmentReport::default();
		for order in orders.iter().filter(|o| o.status.holds_contractor()) {
			report.active_orders += 1;
			match order.contractor_id.as_deref() {
				Some(contractor) => holders.entry(contractor).or_default().push(order),
				None => report.inconsistencies.push(format!(
					"order {} is {} without a contractor",
					order.id, order.status
				)),
			}
		}

		for profile in &profiles {
			let held = holders.remove(profile.user_id.as_str()).unwrap_or_default();
			if profile.is_busy() {
				report.busy_profiles += 1;
			}
			match (profile.current_order_id(), held.as_slice()) {
				(None, []) => {},
				(Some(current), [order]) if order.id == current => {},
				(Some(current), []) => report.inconsistencies.push(format!(
					"contractor {} is busy with {} but no active order holds them",
					truncate_id(&profile.user_id),
					current
				)),
				(current, held) => report.inconsistencies.push(format!(
					"contractor {} is busy with {:?} but held by {:?}",
					truncate_id(&profile.user_id),
					current,
					held.iter().map(|o| o.id.as_str()).collect::<Vec<_>>()
				)),
			}
		}

		for (contractor, held) in holders {
			report.inconsistencies.push(format!(
				"{} active order(s) reference contractor {} without profile",
				held.len(),
				truncate_id(contractor)
			));
		}
		Ok(report)
	}
}
