//! simulado-server: HTTP API over the simulado engine.
//!
//! The `simulado` binary in this crate also carries the operator CLI
//! (init, validate, seed, stats, recompute).

pub mod http;
pub mod identity;

pub use http::{router, AppState};
