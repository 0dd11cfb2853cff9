use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::jobs::JobId;
use crate::providers::ProviderId;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failures of the in-memory job table.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("A job needs at least one provider")]
    NoProviders,

    #[error("Could not allocate a unique job id")]
    IdExhausted,

    #[error("Job {0} is still running and cannot be evicted")]
    NotTerminal(JobId),

    /// A write that would break the job lifecycle rules. Always a bug in the caller.
    #[error("Invariant violation on job {job_id}: {detail}")]
    InvariantViolation { job_id: JobId, detail: String },
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No providers requested")]
    NoProviders,

    #[error("Provider {0} is not configured")]
    ProviderUnavailable(ProviderId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors returned by the HTTP handlers, rendered as a JSON error body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::NoProviders | OrchestratorError::ProviderUnavailable(_) => {
                ApiError::BadRequest(err.to_string())
            }
            OrchestratorError::Store(StoreError::NoProviders) => {
                ApiError::BadRequest(err.to_string())
            }
            OrchestratorError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(format!("IO error: {err}"))
    }
}
