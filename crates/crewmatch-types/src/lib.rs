//! Common types module for the crewmatch system.
//!
//! This module defines the data types shared by every crewmatch component:
//! users and contractor profiles, orders and their status, the category
//! catalog, lifecycle events, HTTP API payloads and configuration validation
//! primitives.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Category catalog types (the read-only tariff table).
pub mod catalog;
/// Lifecycle events published on order transitions.
pub mod events;
/// Order types including the order status enum.
pub mod order;
/// Registry trait for self-registering backend implementations.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// User and contractor profile types.
pub mod user;
/// Small display helpers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use catalog::{Catalog, CatalogError, CategoryEntry, PriceRange};
pub use events::LifecycleEvent;
pub use order::{Order, OrderStatus};
pub use registry::ImplementationRegistry;
pub use storage::StorageKey;
pub use user::{ContractorProfile, Role, User};
pub use utils::truncate_id;
pub use validation::*;
