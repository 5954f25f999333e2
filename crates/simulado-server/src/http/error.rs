//! Mapping engine errors onto HTTP responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use simulado_core::SimuladoError;

/// Error returned by every handler. Renders as `{"message": ...}`.
#[derive(Debug)]
pub enum ApiError {
    /// No identity could be resolved for the request.
    Unauthorized,
    /// The request body or query string could not be decoded.
    BadRequest(String),
    Engine(SimuladoError),
}

impl From<SimuladoError> for ApiError {
    fn from(e: SimuladoError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Engine(e) => {
                let status = StatusCode::from_u16(e.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if e.is_client_error() {
                    (status, e.to_string())
                } else {
                    tracing::error!("request failed: {e}");
                    (status, "Internal server error".to_string())
                }
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulado_core::StorageError;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (SimuladoError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (SimuladoError::not_found("question", "q1"), StatusCode::NOT_FOUND),
            (SimuladoError::Conflict("mine".into()), StatusCode::FORBIDDEN),
            (
                SimuladoError::Storage(StorageError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
