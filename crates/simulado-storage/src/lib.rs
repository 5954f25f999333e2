//! simulado-storage: Persistence backends and configuration.
//!
//! Implements the core `Storage` trait over SQLite and over the Firestore
//! REST API, and picks one at startup from `simulado.toml`.

pub mod config;
pub mod firestore;
pub mod sqlite;

pub use config::{
    create_storage, load_config, load_config_from, IdentityConfig, ServerConfig, SimuladoConfig,
    StorageConfig,
};
pub use firestore::FirestoreStorage;
pub use sqlite::SqliteStorage;
