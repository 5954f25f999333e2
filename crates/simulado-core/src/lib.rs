//! simulado-core: Adaptive exam selection, answer rollups and the storage contract.
//!
//! This crate defines the data model, the `Storage` trait every backend
//! implements, the question selector, the statistics aggregator and the
//! engine that the HTTP server and the CLI drive.

pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod parser;
pub mod selector;
pub mod statistics;
pub mod traits;

pub use engine::SimuladoEngine;
pub use error::{Result, SimuladoError, StorageError};
pub use traits::Storage;
