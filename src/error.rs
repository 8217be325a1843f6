use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::cloud::CloudError;
use crate::voice_api::ApiError;

/// A single rejected form field, shown inline next to the control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced to the dashboard.
///
/// The first four variants are the user-facing taxonomy. `Validation` never
/// involves the external service and is shown inline; the provider-facing
/// variants (including `Rejected`) carry the provider's raw message in a
/// dismissible notice.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// The provider refused a request that passed local validation.
    #[error("rejected by provider: {0}")]
    Rejected(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("cloud storage error: {0}")]
    Cloud(#[from] CloudError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl StudioError {
    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        StudioError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            StudioError::Validation(errors) => errors,
            _ => &[],
        }
    }

    /// Machine-readable kind used in the dismissible notice.
    pub fn kind(&self) -> &'static str {
        match self {
            StudioError::Authentication(_) => "authentication_error",
            StudioError::QuotaExceeded(_) => "quota_exceeded_error",
            StudioError::Network(_) => "network_error",
            StudioError::Validation(_) => "validation_error",
            StudioError::Rejected(_) => "provider_rejected",
            StudioError::NotFound(_) => "not_found",
            StudioError::NotConfigured(_) => "not_configured",
            StudioError::Cloud(_) => "cloud_error",
            StudioError::BadRequest(_) => "bad_request",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            StudioError::Authentication(_) => StatusCode::UNAUTHORIZED,
            StudioError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            StudioError::Network(_) => StatusCode::BAD_GATEWAY,
            StudioError::Validation(_) | StudioError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StudioError::NotFound(_) => StatusCode::NOT_FOUND,
            StudioError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            StudioError::Cloud(CloudError::NotSignedIn) => StatusCode::UNAUTHORIZED,
            StudioError::Cloud(CloudError::Auth(_)) => StatusCode::UNAUTHORIZED,
            StudioError::Cloud(_) => StatusCode::BAD_GATEWAY,
            StudioError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Text shown to the user. External failures keep the provider's wording.
    pub fn notice_message(&self) -> String {
        match self {
            StudioError::Authentication(msg)
            | StudioError::QuotaExceeded(msg)
            | StudioError::Network(msg)
            | StudioError::Rejected(msg)
            | StudioError::BadRequest(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ApiError> for StudioError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Authentication(msg) => StudioError::Authentication(msg),
            ApiError::QuotaExceeded(msg) => StudioError::QuotaExceeded(msg),
            ApiError::Network(msg) => StudioError::Network(msg),
            ApiError::Validation(msg) => StudioError::Rejected(msg),
        }
    }
}

impl IntoResponse for StudioError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            StudioError::Validation(errors) => json!({
                "error": self.kind(),
                "field_errors": errors,
            }),
            _ => json!({
                "error": self.kind(),
                "notice": {
                    "kind": self.kind(),
                    "message": self.notice_message(),
                    "dismissible": true,
                }
            }),
        };
        (status, Json(body)).into_response()
    }
}
