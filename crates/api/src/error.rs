use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use wishlist_core::domain::error::ValidationError;

#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    NotFound,
    /// No store configured (degraded mode).
    Unavailable,
    /// Scraping the product page failed.
    Upstream(anyhow::Error),
    Internal(anyhow::Error),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<ValidationError>() {
            Ok(v) => ApiError::Validation(v),
            Err(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "item store unavailable".to_string(),
            ),
            ApiError::Upstream(e) => {
                tracing::warn!(error = %format!("{e:#}"), "scrape failed");
                (StatusCode::BAD_GATEWAY, format!("{e:#}"))
            }
            ApiError::Internal(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %format!("{e:#}"), "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
