//! Order lifecycle handler.
//!
//! Every write reads the records it depends on with their versions, runs the
//! state machine and the availability predicate against them, and commits the
//! order and the contractor profile in one conditional batch. Either both land
//! or neither does, which keeps `current_order_id` in step with the order that
//! holds the contractor.

use super::{committed, retry_on_conflict};
use crate::engine::event_bus::EventBus;
use crate::matching::AvailabilityIndex;
use crate::state::OrderStateMachine;
use crate::LifecycleError;
use chrono::Utc;
use crewmatch_storage::{StorageService, Versioned};
use crewmatch_types::{
	truncate_id, Catalog, CatalogError, ContractorOrder, ContractorProfile, CreateOrderRequest,
	LifecycleEvent, Order, OrderStatus, Role, StorageKey, User,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Handler for order creation, assignment and the later transitions.
pub struct OrderLifecycle {
	storage: Arc<StorageService>,
	catalog: Arc<Catalog>,
	event_bus: EventBus,
	max_attempts: u32,
}

impl OrderLifecycle {
	pub fn new(
		storage: Arc<StorageService>,
		catalog: Arc<Catalog>,
		event_bus: EventBus,
		max_attempts: u32,
	) -> Self {
		Self {
			storage,
			catalog,
			event_bus,
			max_attempts,
		}
	}

	/// Creates a pending order on behalf of a client.
	#[instrument(skip_all, fields(client = %truncate_id(&request.client_id), category = %request.category))]
	pub async fn create(&self, request: CreateOrderRequest) -> Result<Order, LifecycleError> {
		let order_id = Uuid::new_v4().to_string();
		let order = retry_on_conflict("create_order", self.max_attempts, || {
			self.try_create(&order_id, &request)
		})
		.await?;

		tracing::info!(
			order_id = %truncate_id(&order.id),
			quantity = %order.quantity,
			"Order created"
		);
		self.event_bus
			.publish(LifecycleEvent::OrderCreated {
				order_id: order.id.clone(),
				client_id: order.client_id.clone(),
				category: order.category.clone(),
			})
			.ok();
		Ok(order)
	}

	async fn try_create(
		&self,
		order_id: &str,
		request: &CreateOrderRequest,
	) -> Result<Option<Order>, LifecycleError> {
		let client = self.load_user(&request.client_id).await?;
		if !client.value.has_role(Role::Client) {
			return Err(LifecycleError::InvalidRole {
				user_id: request.client_id.clone(),
				reason: format!("only clients can create orders, user is a {}", client.value.role),
			});
		}
		let category = match self.catalog.orderable(&request.category) {
			Ok(_) => Catalog::normalize_code(&request.category),
			Err(CatalogError::Unknown(code)) | Err(CatalogError::AddonOnly(code)) => {
				return Err(LifecycleError::UnknownCategory(code));
			},
		};
		if request.quantity <= Decimal::ZERO {
			return Err(LifecycleError::InvalidQuantity(request.quantity));
		}

		let now = Utc::now();
		let order = Order {
			id: order_id.to_string(),
			client_id: client.value.id.clone(),
			category,
			quantity: request.quantity,
			location: request
				.location
				.as_deref()
				.map(str::trim)
				.filter(|l| !l.is_empty())
				.map(String::from),
			status: OrderStatus::Pending,
			contractor_id: None,
			created_at: now,
			accepted_at: None,
			completed_at: None,
			updated_at: now,
		};

		let mut tx = self.storage.transaction();
		tx.insert(StorageKey::Orders, order_id, &order)?;
		// Re-asserting the user record fails the batch if the role changed.
		tx.replace(StorageKey::Users, &client.value.id, &client, &client.value)?;

		if !committed(tx.commit().await)? {
			return Ok(None);
		}
		Ok(Some(order))
	}

	/// Assigns a pending order to a contractor and marks them busy.
	///
	/// Under concurrent calls on the same order exactly one succeeds; the
	/// others re-read the order and fail with `OrderNotPending`. A contractor
	/// racing on two orders likewise wins at most one.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), contractor = %truncate_id(contractor_id)))]
	pub async fn accept(&self, order_id: &str, contractor_id: &str) -> Result<Order, LifecycleError> {
		let order = retry_on_conflict("accept_order", self.max_attempts, || {
			self.try_accept(order_id, contractor_id)
		})
		.await?;

		tracing::info!("Order accepted");
		self.event_bus
			.publish(LifecycleEvent::OrderAccepted {
				order_id: order.id.clone(),
				client_id: order.client_id.clone(),
				contractor_id: contractor_id.to_string(),
			})
			.ok();
		Ok(order)
	}

	async fn try_accept(
		&self,
		order_id: &str,
		contractor_id: &str,
	) -> Result<Option<Order>, LifecycleError> {
		let now = Utc::now();
		let current = self.load_order(order_id).await?;
		let mut order = current.value.clone();
		OrderStateMachine::transition(&mut order, OrderStatus::Accepted, now)?;

		let unavailable = |reason: &'static str| LifecycleError::ContractorUnavailable {
			contractor_id: contractor_id.to_string(),
			reason,
		};
		let user = self.load_user(contractor_id).await?;
		if !user.value.has_role(Role::Contractor) {
			return Err(unavailable("user is not a contractor"));
		}
		let profile: Versioned<ContractorProfile> = self
			.storage
			.try_retrieve_versioned(StorageKey::Profiles, contractor_id)
			.await?
			.ok_or_else(|| unavailable("no contractor profile"))?;
		AvailabilityIndex::check(&profile.value, &order.category)
			.map_err(|u| unavailable(u.reason()))?;

		order.contractor_id = Some(contractor_id.to_string());
		let mut assigned = profile.value.clone();
		assigned.assign(order_id, now);

		let mut tx = self.storage.transaction();
		tx.replace(StorageKey::Orders, order_id, &current, &order)?
			.replace(StorageKey::Profiles, contractor_id, &profile, &assigned)?
			.replace(StorageKey::Users, contractor_id, &user, &user.value)?;

		if !committed(tx.commit().await)? {
			return Ok(None);
		}
		Ok(Some(order))
	}

	/// Marks an accepted order as in progress.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn start(&self, order_id: &str) -> Result<Order, LifecycleError> {
		let order = retry_on_conflict("start_order", self.max_attempts, || {
			self.try_start(order_id)
		})
		.await?;

		tracing::info!("Order started");
		self.event_bus
			.publish(LifecycleEvent::OrderStarted {
				order_id: order.id.clone(),
				client_id: order.client_id.clone(),
				contractor_id: order.contractor_id.clone().unwrap_or_default(),
			})
			.ok();
		Ok(order)
	}

	async fn try_start(&self, order_id: &str) -> Result<Option<Order>, LifecycleError> {
		let current = self.load_order(order_id).await?;
		let mut order = current.value.clone();
		OrderStateMachine::transition(&mut order, OrderStatus::InProgress, Utc::now())?;

		let mut tx = self.storage.transaction();
		tx.replace(StorageKey::Orders, order_id, &current, &order)?;
		if !committed(tx.commit().await)? {
			return Ok(None);
		}
		Ok(Some(order))
	}

	/// Completes an active order, releasing its contractor and counting the
	/// completion on their profile.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn complete(&self, order_id: &str) -> Result<Order, LifecycleError> {
		let order = retry_on_conflict("complete_order", self.max_attempts, || {
			self.try_complete(order_id)
		})
		.await?;

		tracing::info!(
			contractor = %order.contractor_id.as_deref().map(truncate_id).unwrap_or_default(),
			"Order completed"
		);
		self.event_bus
			.publish(LifecycleEvent::OrderCompleted {
				order_id: order.id.clone(),
				client_id: order.client_id.clone(),
				contractor_id: order.contractor_id.clone(),
			})
			.ok();
		Ok(order)
	}

	async fn try_complete(&self, order_id: &str) -> Result<Option<Order>, LifecycleError> {
		let now = Utc::now();
		let current = self.load_order(order_id).await?;
		let mut order = current.value.clone();
		OrderStateMachine::transition(&mut order, OrderStatus::Completed, now)?;

		let mut tx = self.storage.transaction();
		tx.replace(StorageKey::Orders, order_id, &current, &order)?;

		match order.contractor_id.as_deref() {
			Some(contractor_id) => {
				let profile: Option<Versioned<ContractorProfile>> = self
					.storage
					.try_retrieve_versioned(StorageKey::Profiles, contractor_id)
					.await?;
				match profile {
					Some(profile) => {
						let mut updated = profile.value.clone();
						if !updated.release(order_id, now) {
							tracing::warn!(
								contractor = %truncate_id(contractor_id),
								"Contractor was not holding the completed order"
							);
						}
						updated.record_completion(now);
						tx.replace(StorageKey::Profiles, contractor_id, &profile, &updated)?;
					},
					None => tracing::warn!(
						contractor = %truncate_id(contractor_id),
						"Completed order references a contractor without profile"
					),
				}
			},
			None => tracing::warn!("Completed order has no contractor"),
		}

		if !committed(tx.commit().await)? {
			return Ok(None);
		}
		Ok(Some(order))
	}

	/// Cancels an order that is not completed.
	///
	/// Cancelling a cancelled order is a no-op. When the order holds its
	/// contractor, the same batch frees them.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel(&self, order_id: &str) -> Result<Order, LifecycleError> {
		let (order, changed) = retry_on_conflict("cancel_order", self.max_attempts, || {
			self.try_cancel(order_id)
		})
		.await?;

		if !changed {
			tracing::debug!("Order already cancelled");
			return Ok(order);
		}
		tracing::info!("Order cancelled");
		self.event_bus
			.publish(LifecycleEvent::OrderCancelled {
				order_id: order.id.clone(),
				client_id: order.client_id.clone(),
				contractor_id: order.contractor_id.clone(),
			})
			.ok();
		Ok(order)
	}

	async fn try_cancel(&self, order_id: &str) -> Result<Option<(Order, bool)>, LifecycleError> {
		let now = Utc::now();
		let current = self.load_order(order_id).await?;
		if current.value.status == OrderStatus::Cancelled {
			return Ok(Some((current.value, false)));
		}

		let held = current.value.status.holds_contractor();
		let mut order = current.value.clone();
		OrderStateMachine::transition(&mut order, OrderStatus::Cancelled, now)?;

		let mut tx = self.storage.transaction();
		tx.replace(StorageKey::Orders, order_id, &current, &order)?;

		if let (true, Some(contractor_id)) = (held, order.contractor_id.as_deref()) {
			let profile: Option<Versioned<ContractorProfile>> = self
				.storage
				.try_retrieve_versioned(StorageKey::Profiles, contractor_id)
				.await?;
			if let Some(profile) = profile {
				let mut updated = profile.value.clone();
				if updated.release(order_id, now) {
					tx.replace(StorageKey::Profiles, contractor_id, &profile, &updated)?;
				}
			}
		}

		if !committed(tx.commit().await)? {
			return Ok(None);
		}
		Ok(Some((order, true)))
	}

	pub async fn get(&self, order_id: &str) -> Result<Order, LifecycleError> {
		Ok(self.load_order(order_id).await?.value)
	}

	/// Orders assigned to a contractor, newest first.
	pub async fn orders_for_contractor(
		&self,
		user_id: &str,
	) -> Result<Vec<ContractorOrder>, LifecycleError> {
		self.require_contractor(user_id).await?;
		let orders = self
			.orders_where(|o| o.contractor_id.as_deref() == Some(user_id))
			.await?;
		self.with_client_contacts(orders).await
	}

	/// Pending orders in categories the contractor serves, newest first.
	pub async fn pending_for_contractor(
		&self,
		user_id: &str,
	) -> Result<Vec<ContractorOrder>, LifecycleError> {
		self.require_contractor(user_id).await?;
		let Some(profile) = self
			.storage
			.try_retrieve::<ContractorProfile>(StorageKey::Profiles, user_id)
			.await?
		else {
			return Ok(Vec::new());
		};
		let orders = self
			.orders_where(|o| o.status == OrderStatus::Pending && profile.serves(&o.category))
			.await?;
		self.with_client_contacts(orders).await
	}

	/// Joins each order with its client's name and phone. A missing client
	/// record leaves both empty.
	async fn with_client_contacts(
		&self,
		orders: Vec<Order>,
	) -> Result<Vec<ContractorOrder>, LifecycleError> {
		let mut clients: HashMap<String, Option<User>> = HashMap::new();
		let mut listing = Vec::with_capacity(orders.len());
		for order in orders {
			if !clients.contains_key(&order.client_id) {
				let client: Option<User> = self
					.storage
					.try_retrieve(StorageKey::Users, &order.client_id)
					.await?;
				clients.insert(order.client_id.clone(), client);
			}
			let (client_name, client_phone) = clients
				.get(&order.client_id)
				.and_then(Option::as_ref)
				.map(|c| (c.name.clone(), c.phone.clone()))
				.unwrap_or_default();
			listing.push(ContractorOrder {
				order,
				client_name,
				client_phone,
			});
		}
		Ok(listing)
	}

	/// Orders requested by a user, newest first.
	pub async fn orders_for_client(&self, user_id: &str) -> Result<Vec<Order>, LifecycleError> {
		self.load_user(user_id).await?;
		self.orders_where(|o| o.client_id == user_id).await
	}

	async fn orders_where<F>(&self, predicate: F) -> Result<Vec<Order>, LifecycleError>
	where
		F: Fn(&Order) -> bool,
	{
		let mut orders: Vec<Order> = self
			.storage
			.list::<Order>(StorageKey::Orders)
			.await?
			.into_iter()
			.filter(|o| predicate(o))
			.collect();
		orders.sort_by(|a, b| {
			b.created_at
				.cmp(&a.created_at)
				.then_with(|| a.id.cmp(&b.id))
		});
		Ok(orders)
	}

	async fn require_contractor(&self, user_id: &str) -> Result<(), LifecycleError> {
		let user = self.load_user(user_id).await?;
		if !user.value.has_role(Role::Contractor) {
			return Err(LifecycleError::InvalidRole {
				user_id: user_id.to_string(),
				reason: format!("user is a {}, not a contractor", user.value.role),
			});
		}
		Ok(())
	}

	async fn load_order(&self, order_id: &str) -> Result<Versioned<Order>, LifecycleError> {
		self.storage
			.try_retrieve_versioned(StorageKey::Orders, order_id)
			.await?
			.ok_or_else(|| LifecycleError::order_not_found(order_id))
	}

	async fn load_user(&self, user_id: &str) -> Result<Versioned<User>, LifecycleError> {
		self.storage
			.try_retrieve_versioned(StorageKey::Users, user_id)
			.await?
			.ok_or_else(|| LifecycleError::user_not_found(user_id))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{accept_all, client, contractor, engine, file_engine};
	use crate::ErrorKind;
	use crewmatch_types::{UpsertProfileRequest, UpsertUserRequest};

	fn request(client_id: &str, category: &str, quantity: i64) -> CreateOrderRequest {
		CreateOrderRequest {
			client_id: client_id.to_string(),
			category: category.to_string(),
			quantity: Decimal::from(quantity),
			location: Some("  Lenina 1 ".into()),
		}
	}

	async fn profile_of(engine: &crate::MatchEngine, user_id: &str) -> ContractorProfile {
		engine
			.directory()
			.get_user(user_id)
			.await
			.unwrap()
			.1
			.unwrap()
	}

	#[tokio::test]
	async fn test_create_accept_complete_flow() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &["comfort"]).await;
		let orders = engine.orders();
		let mut events = engine.event_bus().subscribe();

		let order = orders.create(request("c1", "comfort", 50)).await.unwrap();
		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.quantity, Decimal::from(50));
		assert_eq!(order.location.as_deref(), Some("Lenina 1"));
		assert!(Uuid::parse_str(&order.id).is_ok());

		let accepted = orders.accept(&order.id, "a").await.unwrap();
		assert_eq!(accepted.status, OrderStatus::Accepted);
		assert_eq!(accepted.contractor_id.as_deref(), Some("a"));
		assert!(accepted.accepted_at.is_some());
		assert_eq!(
			profile_of(&engine, "a").await.current_order_id(),
			Some(order.id.as_str())
		);

		let completed = orders.complete(&order.id).await.unwrap();
		assert_eq!(completed.status, OrderStatus::Completed);
		assert!(completed.completed_at.is_some());
		let profile = profile_of(&engine, "a").await;
		assert!(profile.current_order_id().is_none());
		assert_eq!(profile.completed_orders(), 1);

		let kinds: Vec<&str> = [
			events.recv().await.unwrap(),
			events.recv().await.unwrap(),
			events.recv().await.unwrap(),
		]
		.iter()
		.map(|e| e.kind())
		.collect();
		assert_eq!(kinds, vec!["order_created", "order_accepted", "order_completed"]);
	}

	#[tokio::test]
	async fn test_create_validation() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "k1", &[]).await;
		let orders = engine.orders();

		let err = orders.create(request("k1", "comfort", 10)).await.unwrap_err();
		assert!(matches!(err, LifecycleError::InvalidRole { .. }));

		let err = orders.create(request("c1", "marble", 10)).await.unwrap_err();
		assert!(matches!(err, LifecycleError::UnknownCategory(_)));

		let err = orders.create(request("c1", "business", 10)).await.unwrap_err();
		assert!(matches!(err, LifecycleError::UnknownCategory(code) if code == "business"));

		for quantity in [0, -5] {
			let err = orders
				.create(request("c1", "comfort", quantity))
				.await
				.unwrap_err();
			assert!(matches!(err, LifecycleError::InvalidQuantity(_)));
			assert_eq!(err.kind(), ErrorKind::Validation);
		}

		let err = orders.create(request("ghost", "comfort", 10)).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);

		let order = orders.create(request("c1", " Premium ", 10)).await.unwrap();
		assert_eq!(order.category, "premium");
	}

	#[tokio::test]
	async fn test_inactive_contractor_cannot_accept() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &["comfort"]).await;
		engine
			.directory()
			.upsert_profile(UpsertProfileRequest {
				user_id: "a".into(),
				experience_years: None,
				categories: vec!["comfort".into()],
				active: false,
			})
			.await
			.unwrap();

		let order = engine
			.orders()
			.create(request("c1", "comfort", 50))
			.await
			.unwrap();
		let err = engine.orders().accept(&order.id, "a").await.unwrap_err();
		assert!(matches!(err, LifecycleError::ContractorUnavailable { .. }));
		assert_eq!(
			engine.orders().get(&order.id).await.unwrap().status,
			OrderStatus::Pending
		);
	}

	#[tokio::test]
	async fn test_second_contractor_gets_order_not_pending() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &["comfort"]).await;
		contractor(&engine, "b", &["comfort"]).await;
		let orders = engine.orders();

		let order = orders.create(request("c1", "comfort", 50)).await.unwrap();
		orders.accept(&order.id, "a").await.unwrap();

		let err = orders.accept(&order.id, "b").await.unwrap_err();
		assert!(matches!(err, LifecycleError::OrderNotPending { .. }));
		assert_eq!(err.kind(), ErrorKind::StateConflict);
		assert!(!profile_of(&engine, "b").await.is_busy());
	}

	#[tokio::test]
	async fn test_accept_requires_serving_contractor() {
		let engine = engine();
		client(&engine, "c1").await;
		client(&engine, "c2").await;
		contractor(&engine, "a", &["premium"]).await;
		let orders = engine.orders();
		let order = orders.create(request("c1", "comfort", 50)).await.unwrap();

		let err = orders.accept(&order.id, "a").await.unwrap_err();
		assert!(matches!(
			err,
			LifecycleError::ContractorUnavailable { reason, .. } if reason == "category not served"
		));

		let err = orders.accept(&order.id, "c2").await.unwrap_err();
		assert!(matches!(err, LifecycleError::ContractorUnavailable { .. }));

		let err = orders.accept(&order.id, "ghost").await.unwrap_err();
		assert!(matches!(err, LifecycleError::NotFound { entity: "User", .. }));

		let err = orders.accept("missing", "a").await.unwrap_err();
		assert!(matches!(err, LifecycleError::NotFound { entity: "Order", .. }));
	}

	#[tokio::test]
	async fn test_busy_contractor_cannot_take_second_order() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &["comfort"]).await;
		let orders = engine.orders();
		let first = orders.create(request("c1", "comfort", 10)).await.unwrap();
		let second = orders.create(request("c1", "comfort", 20)).await.unwrap();

		orders.accept(&first.id, "a").await.unwrap();
		let err = orders.accept(&second.id, "a").await.unwrap_err();
		assert!(matches!(
			err,
			LifecycleError::ContractorUnavailable { reason, .. } if reason == "already assigned to an active order"
		));
	}

	#[tokio::test]
	async fn test_start_and_complete_preconditions() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &[]).await;
		let orders = engine.orders();
		let order = orders.create(request("c1", "comfort", 10)).await.unwrap();

		let err = orders.start(&order.id).await.unwrap_err();
		assert!(matches!(err, LifecycleError::OrderNotAccepted { .. }));
		let err = orders.complete(&order.id).await.unwrap_err();
		assert!(matches!(err, LifecycleError::OrderNotActive { .. }));

		orders.accept(&order.id, "a").await.unwrap();
		let started = orders.start(&order.id).await.unwrap();
		assert_eq!(started.status, OrderStatus::InProgress);
		assert!(profile_of(&engine, "a").await.is_busy());

		orders.complete(&order.id).await.unwrap();
		let err = orders.complete(&order.id).await.unwrap_err();
		assert!(matches!(err, LifecycleError::OrderTerminal { .. }));
	}

	#[tokio::test]
	async fn test_cancel_releases_contractor() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &["comfort"]).await;
		let orders = engine.orders();
		let order = orders.create(request("c1", "comfort", 10)).await.unwrap();
		orders.accept(&order.id, "a").await.unwrap();
		orders.start(&order.id).await.unwrap();

		let cancelled = orders.cancel(&order.id).await.unwrap();
		assert_eq!(cancelled.status, OrderStatus::Cancelled);
		assert_eq!(cancelled.contractor_id.as_deref(), Some("a"));
		let profile = profile_of(&engine, "a").await;
		assert!(!profile.is_busy());
		assert_eq!(profile.completed_orders(), 0);

		// Repeating is a no-op.
		let again = orders.cancel(&order.id).await.unwrap();
		assert_eq!(again.updated_at, cancelled.updated_at);

		let next = orders.create(request("c1", "comfort", 10)).await.unwrap();
		orders.accept(&next.id, "a").await.unwrap();
	}

	#[tokio::test]
	async fn test_cancel_rejects_completed_order() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &[]).await;
		let orders = engine.orders();
		let order = orders.create(request("c1", "comfort", 10)).await.unwrap();
		orders.accept(&order.id, "a").await.unwrap();
		orders.complete(&order.id).await.unwrap();

		let err = orders.cancel(&order.id).await.unwrap_err();
		assert!(matches!(err, LifecycleError::OrderTerminal { .. }));
		assert_eq!(
			orders.get(&order.id).await.unwrap().status,
			OrderStatus::Completed
		);

		let err = orders.cancel("missing").await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);
	}

	#[tokio::test]
	async fn test_cancel_pending_order_leaves_profiles_alone() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &[]).await;
		let orders = engine.orders();
		let held = orders.create(request("c1", "comfort", 10)).await.unwrap();
		let pending = orders.create(request("c1", "comfort", 10)).await.unwrap();
		orders.accept(&held.id, "a").await.unwrap();

		orders.cancel(&pending.id).await.unwrap();
		assert_eq!(
			profile_of(&engine, "a").await.current_order_id(),
			Some(held.id.as_str())
		);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_accepts_on_one_order_have_one_winner() {
		let engine = engine();
		client(&engine, "c1").await;
		let contractors: Vec<String> = (0..8).map(|i| format!("k{}", i)).collect();
		for id in &contractors {
			contractor(&engine, id, &["comfort"]).await;
		}
		let order = engine
			.orders()
			.create(request("c1", "comfort", 50))
			.await
			.unwrap();

		let attempts: Vec<(String, String)> = contractors
			.iter()
			.map(|c| (order.id.clone(), c.clone()))
			.collect();
		let results = accept_all(&engine, attempts).await;

		let winners: Vec<&Order> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
		assert_eq!(winners.len(), 1);
		for err in results.iter().filter_map(|r| r.as_ref().err()) {
			assert!(
				matches!(err, LifecycleError::OrderNotPending { .. }),
				"unexpected error: {}",
				err
			);
		}

		let winner = winners[0].contractor_id.clone().unwrap();
		for id in &contractors {
			let profile = profile_of(&engine, id).await;
			if *id == winner {
				assert_eq!(profile.current_order_id(), Some(order.id.as_str()));
			} else {
				assert!(!profile.is_busy());
			}
		}
		assert!(engine.audit_assignments().await.unwrap().is_consistent());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_accepts_on_disk_have_one_winner() {
		let dir = tempfile::tempdir().unwrap();
		let engine = file_engine(dir.path());
		client(&engine, "c1").await;
		let contractors: Vec<String> = (0..6).map(|i| format!("k{}", i)).collect();
		for id in &contractors {
			contractor(&engine, id, &["comfort"]).await;
		}
		let first = engine
			.orders()
			.create(request("c1", "comfort", 50))
			.await
			.unwrap();
		let second = engine
			.orders()
			.create(request("c1", "comfort", 60))
			.await
			.unwrap();

		// Every contractor goes for both orders at once.
		let attempts: Vec<(String, String)> = contractors
			.iter()
			.flat_map(|c| [(first.id.clone(), c.clone()), (second.id.clone(), c.clone())])
			.collect();
		let results = accept_all(&engine, attempts).await;

		let winners: Vec<&Order> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
		assert_eq!(winners.len(), 2);
		assert_ne!(winners[0].contractor_id, winners[1].contractor_id);
		for err in results.iter().filter_map(|r| r.as_ref().err()) {
			assert!(
				matches!(
					err,
					LifecycleError::OrderNotPending { .. }
						| LifecycleError::ContractorUnavailable { .. }
						| LifecycleError::Contention(_)
				),
				"unexpected error: {}",
				err
			);
		}
		assert!(engine.audit_assignments().await.unwrap().is_consistent());

		// The outcome is what landed on disk, not just in the running engine.
		drop(engine);
		let reopened = file_engine(dir.path());
		for winner in winners {
			let stored = reopened.orders().get(&winner.id).await.unwrap();
			assert_eq!(stored.status, OrderStatus::Accepted);
			let holder = stored.contractor_id.unwrap();
			assert_eq!(
				profile_of(&reopened, &holder).await.current_order_id(),
				Some(winner.id.as_str())
			);
		}
		assert!(reopened.audit_assignments().await.unwrap().is_consistent());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_one_contractor_racing_two_orders_wins_at_most_one() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &["comfort"]).await;
		let first = engine
			.orders()
			.create(request("c1", "comfort", 10))
			.await
			.unwrap();
		let second = engine
			.orders()
			.create(request("c1", "comfort", 20))
			.await
			.unwrap();

		let results = accept_all(
			&engine,
			vec![
				(first.id.clone(), "a".to_string()),
				(second.id.clone(), "a".to_string()),
			],
		)
		.await;

		assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
		let statuses = [
			engine.orders().get(&first.id).await.unwrap().status,
			engine.orders().get(&second.id).await.unwrap().status,
		];
		assert_eq!(
			statuses
				.iter()
				.filter(|s| **s == OrderStatus::Accepted)
				.count(),
			1
		);
		assert!(engine.audit_assignments().await.unwrap().is_consistent());
	}

	#[tokio::test]
	async fn test_order_listings_newest_first() {
		let engine = engine();
		client(&engine, "c1").await;
		client(&engine, "c2").await;
		contractor(&engine, "a", &["comfort"]).await;
		let orders = engine.orders();

		let older = orders.create(request("c1", "comfort", 10)).await.unwrap();
		let premium = orders.create(request("c1", "premium", 10)).await.unwrap();
		let newer = orders.create(request("c2", "comfort", 10)).await.unwrap();

		let pending: Vec<String> = orders
			.pending_for_contractor("a")
			.await
			.unwrap()
			.into_iter()
			.map(|o| o.order.id)
			.collect();
		assert_eq!(pending, vec![newer.id.clone(), older.id.clone()]);

		orders.accept(&older.id, "a").await.unwrap();
		let assigned = orders.orders_for_contractor("a").await.unwrap();
		assert_eq!(assigned.len(), 1);
		assert_eq!(assigned[0].order.id, older.id);

		let mine: Vec<String> = orders
			.orders_for_client("c1")
			.await
			.unwrap()
			.into_iter()
			.map(|o| o.id)
			.collect();
		assert_eq!(mine, vec![premium.id, older.id]);

		let err = orders.orders_for_contractor("c1").await.unwrap_err();
		assert!(matches!(err, LifecycleError::InvalidRole { .. }));
		let err = orders.orders_for_client("ghost").await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);
	}

	#[tokio::test]
	async fn test_contractor_listings_carry_client_contacts() {
		let engine = engine();
		client(&engine, "c1").await;
		contractor(&engine, "a", &["comfort"]).await;
		engine
			.directory()
			.upsert_user(UpsertUserRequest {
				id: "c2".to_string(),
				role: Some(Role::Client),
				name: Some("Dana".to_string()),
				phone: Some("+100200".to_string()),
				..Default::default()
			})
			.await
			.unwrap();
		let orders = engine.orders();

		let first = orders.create(request("c1", "comfort", 10)).await.unwrap();
		let second = orders.create(request("c2", "comfort", 10)).await.unwrap();

		let pending = orders.pending_for_contractor("a").await.unwrap();
		assert_eq!(pending.len(), 2);
		let listed = |id: &str| pending.iter().find(|o| o.order.id == id).unwrap();
		assert_eq!(listed(&second.id).client_name.as_deref(), Some("Dana"));
		assert_eq!(listed(&second.id).client_phone.as_deref(), Some("+100200"));
		assert_eq!(listed(&first.id).client_name.as_deref(), Some("Client c1"));
		assert_eq!(listed(&first.id).client_phone, None);

		orders.accept(&second.id, "a").await.unwrap();
		let assigned = orders.orders_for_contractor("a").await.unwrap();
		assert_eq!(assigned.len(), 1);
		assert_eq!(assigned[0].order.status, OrderStatus::Accepted);
		assert_eq!(assigned[0].client_name.as_deref(), Some("Dana"));
		assert_ne!(assigned[0].order.id, first.id);
	}
}
