//! Endpoint implementations of the crewmatch API.
//!
//! Each function takes the engine and already-extracted input and returns a
//! response payload or an [`APIError`](crewmatch_types::APIError); routing and
//! request logging live in `server.rs`.

pub mod catalog;
pub mod contractor;
pub mod order;
pub mod user;
