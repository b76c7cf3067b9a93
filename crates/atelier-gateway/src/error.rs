use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use atelier_common::Error;

/// Maps the shared error taxonomy onto HTTP status classes. Internal
/// details are logged, never returned to the caller.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    /// The uniform not-found-or-unauthorized response: existence is never
    /// revealed to callers who do not own the resource.
    pub fn not_found() -> Self {
        Self(Error::NotFound("resource not found".into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Error::Unauthorized(_) | Error::Auth(_) => {
                (StatusCode::UNAUTHORIZED, "unauthorized".to_string())
            }
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not found".to_string()),
            Error::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            other => {
                error!("internal error serving request: {other}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
