//! Maps [`vnquote_core::CoreError`] onto HTTP responses. Grounded on the
//! teacher's `ApiError`/`ApiResult` pattern (one wrapper type, one
//! `IntoResponse` impl, every response carries a `detail` string).
//!
//! Rate-limit conditions surface as 503 with retry-advisory wording
//! rather than 429 — a deliberate simplification of the contract.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use vnquote_core::CoreError;

pub struct ApiError(pub CoreError);

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match self.0 {
            CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            CoreError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg),
            CoreError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg),
            CoreError::TransientProvider(msg) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg),
            CoreError::RateLimited { retry_after_secs } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                format!("upstream is rate limiting requests, retry in about {retry_after_secs}s"),
            ),
            CoreError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "an internal error occurred".to_string(),
            ),
        };

        let body = ErrorBody { error: kind, detail };
        (status, Json(body)).into_response()
    }
}
