//! HTTP error mapping (§6.1 status codes; §7 taxonomy).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docforge_jobs::StoreError;
use docforge_shared::DocforgeError;
use serde_json::json;

/// A `DocforgeError`/store failure translated to an HTTP response.
/// Mirrors the reference codebase's `ApiError: IntoResponse` shape.
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, code, message: message.into() }
    }

    pub fn not_found(what: &str) -> Self {
        Self { status: StatusCode::NOT_FOUND, code: "not_found", message: format!("{what} not found") }
    }

    pub fn not_ready() -> Self {
        Self { status: StatusCode::NOT_FOUND, code: "not_ready", message: "artifact not ready yet".to_string() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self { status: StatusCode::CONFLICT, code: "conflict", message: message.into() }
    }

    pub fn too_many_requests() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "rate_limited",
            message: "too many requests, slow down".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, code: "internal_error", message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.code, "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<DocforgeError> for ApiError {
    fn from(err: DocforgeError) -> Self {
        match &err {
            DocforgeError::Input { .. } => ApiError::bad_request(err.code(), err.to_string()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal(err.to_string())
    }
}
