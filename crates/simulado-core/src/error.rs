//! Error types for exam generation, answer recording and storage.
//!
//! `StorageError` is what backends return. `SimuladoError` is the taxonomy the
//! engine reports to callers; the HTTP layer maps it to status codes through
//! [`SimuladoError::status_code`] without string matching.

use thiserror::Error;

/// Failures reported by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached (network, closed pool, I/O).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with an error status.
    #[error("storage error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    /// A write violated a backend constraint.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A stored record could not be decoded into the model.
    #[error("malformed record in {collection}: {message}")]
    Malformed {
        collection: &'static str,
        message: String,
    },

    /// A record that must exist for an update was missing.
    #[error("{collection} record not found: {id}")]
    Missing {
        collection: &'static str,
        id: String,
    },

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the simulado engine.
#[derive(Debug, Error)]
pub enum SimuladoError {
    /// Malformed or empty input.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A referenced user profile, question or exam does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requesting user does not own the exam being touched.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The persistence layer failed. Never retried by the engine.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SimuladoError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        SimuladoError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// HTTP status this error should be reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            SimuladoError::Validation(_) => 400,
            SimuladoError::NotFound { .. } => 404,
            SimuladoError::Conflict(_) => 403,
            SimuladoError::Storage(_) => 500,
        }
    }

    /// Returns `true` for errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

pub type Result<T, E = SimuladoError> = std::result::Result<T, E>;
