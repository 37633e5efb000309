//! State management for orders.
//!
//! This module provides the state machine that validates order status
//! transitions. Persistence and the contractor side of a transition live in
//! the handlers, which apply both through one atomic batch.

pub mod order;

pub use order::OrderStateMachine;
