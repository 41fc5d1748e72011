use crate::billing::BillingError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use pulse_scraper::LlmError;
use serde::Serialize;

/// Error body shared by every JSON endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0}")]
    Unavailable(String),

    #[error("Upstream service failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::NotConfigured(what) => {
                ApiError::Unavailable(format!("Billing is not configured: {}", what))
            }
            BillingError::InvalidSignature(reason) => {
                ApiError::BadRequest(format!("Webhook signature rejected: {}", reason))
            }
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(details) => ErrorResponse {
                error: "Validation failed".to_string(),
                details: Some(details.clone()),
                retry_after_secs: None,
            },
            ApiError::RateLimited { retry_after_secs } => ErrorResponse {
                error: self.to_string(),
                details: None,
                retry_after_secs: Some(*retry_after_secs),
            },
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                ErrorResponse {
                    error: "Internal server error".to_string(),
                    details: None,
                    retry_after_secs: None,
                }
            }
            other => ErrorResponse {
                error: other.to_string(),
                details: None,
                retry_after_secs: None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
