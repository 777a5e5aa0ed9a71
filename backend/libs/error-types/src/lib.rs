use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use crypto_core::{Forbidden, VerificationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Service-level error shared by every HTTP service.
///
/// Converts into the common JSON [`ErrorResponse`] body through
/// `actix_web::ResponseError`, so handlers can return `Result<_, ServiceError>`.
///
/// ```ignore
/// let task = repo.find(id).await?.ok_or_else(|| ServiceError::NotFound(format!("task {id}")))?;
/// ```
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Every token verification failure lands here with the same message
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::Unauthorized => 401,
            ServiceError::Forbidden => 403,
            ServiceError::ValidationError(_) => 400,
            ServiceError::BadRequest(_) => 400,
            ServiceError::Conflict(_) => 409,
            ServiceError::ServiceUnavailable(_) => 503,
            ServiceError::InternalError(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_codes::NOT_FOUND,
            ServiceError::Unauthorized => error_codes::TOKEN_INVALID,
            ServiceError::Forbidden => error_codes::FORBIDDEN,
            ServiceError::ValidationError(_) => error_codes::VALIDATION_FAILED,
            ServiceError::BadRequest(_) => error_codes::BAD_REQUEST,
            ServiceError::Conflict(_) => error_codes::CONFLICT,
            ServiceError::ServiceUnavailable(_) => error_codes::SERVICE_UNAVAILABLE,
            ServiceError::InternalError(_) => error_codes::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_types::NOT_FOUND_ERROR,
            ServiceError::Unauthorized => error_types::AUTHENTICATION_ERROR,
            ServiceError::Forbidden => error_types::AUTHORIZATION_ERROR,
            ServiceError::ValidationError(_) | ServiceError::BadRequest(_) => {
                error_types::VALIDATION_ERROR
            }
            ServiceError::Conflict(_) => error_types::CONFLICT_ERROR,
            ServiceError::ServiceUnavailable(_) => error_types::SERVICE_UNAVAILABLE_ERROR,
            ServiceError::InternalError(_) => error_types::SERVER_ERROR,
        }
    }

    /// Internal details are never sent to clients
    fn public_message(&self) -> String {
        match self {
            ServiceError::InternalError(_) => "Internal server error".to_string(),
            ServiceError::ServiceUnavailable(_) => "Service unavailable".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(
            self.reason_phrase(),
            &self.public_message(),
            self.status_code(),
            self.error_type(),
            self.error_code(),
        )
    }

    fn reason_phrase(&self) -> &'static str {
        self.status()
            .canonical_reason()
            .unwrap_or("Error")
    }

    fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status()).json(self.to_response())
    }
}

impl From<VerificationError> for ServiceError {
    fn from(_: VerificationError) -> Self {
        ServiceError::Unauthorized
    }
}

impl From<Forbidden> for ServiceError {
    fn from(_: Forbidden) -> Self {
        ServiceError::Forbidden
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}

/// Common JSON error body for every service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP reason phrase
    pub error: String,

    /// Human readable message
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Error category for client-side routing, see [`error_types`]
    pub error_type: String,

    /// Machine readable code, see [`error_codes`]
    pub code: String,

    /// Correlation id of the failing request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// ISO 8601
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

pub mod error_codes {
    // Authentication / authorization
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const FORBIDDEN: &str = "FORBIDDEN";

    // Generic
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const CONFLICT: &str = "CONFLICT";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
}

pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const SERVICE_UNAVAILABLE_ERROR: &str = "service_unavailable_error";
}
