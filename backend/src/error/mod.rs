//! Centralized error handling for TicketHub
//!
//! `ServiceError` is the taxonomy returned by the booking, listing, payment
//! and account services. `ApiError` is its HTTP projection: every variant
//! maps to a status code and a stable error code in the JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::booking::BookingStatus;

/// Errors produced by the domain services
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Insufficient inventory: requested {requested}, remaining {remaining}")]
    InsufficientInventory { requested: i32, remaining: i32 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Advertisement slot limit of {cap} reached")]
    SlotLimitReached { cap: u32 },

    #[error("Listing departed at {departure_at}")]
    ExpiredListing { departure_at: DateTime<Utc> },

    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    InsufficientInventory(String),

    #[error("{0}")]
    InvalidStateTransition(String),

    #[error("{0}")]
    SlotLimitReached(String),

    #[error("{0}")]
    ExpiredListing(String),

    #[error("{0}")]
    PaymentVerificationFailed(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InsufficientInventory(_) => "INSUFFICIENT_INVENTORY",
            ApiError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            ApiError::SlotLimitReached(_) => "SLOT_LIMIT_REACHED",
            ApiError::ExpiredListing(_) => "EXPIRED_LISTING",
            ApiError::PaymentVerificationFailed(_) => "PAYMENT_VERIFICATION_FAILED",
            ApiError::TooManyRequests => "TOO_MANY_REQUESTS",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_)
            | ApiError::InsufficientInventory(_)
            | ApiError::InvalidStateTransition(_)
            | ApiError::SlotLimitReached(_) => StatusCode::CONFLICT,
            ApiError::ExpiredListing(_) => StatusCode::GONE,
            ApiError::PaymentVerificationFailed(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        match &self {
            ApiError::InternalError(_)
            | ApiError::DatabaseError(_)
            | ApiError::ServiceUnavailable(_)
            | ApiError::ExternalServiceError(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::InsufficientInventory { .. } => ApiError::InsufficientInventory(message),
            ServiceError::InvalidStateTransition { .. } => {
                ApiError::InvalidStateTransition(message)
            }
            ServiceError::SlotLimitReached { .. } => ApiError::SlotLimitReached(message),
            ServiceError::ExpiredListing { .. } => ApiError::ExpiredListing(message),
            ServiceError::PaymentVerificationFailed(_) => {
                ApiError::PaymentVerificationFailed(message)
            }
            ServiceError::NotFound(_) => ApiError::NotFound(message),
            ServiceError::Forbidden(_) => ApiError::Forbidden(message),
            ServiceError::Validation(msg) => ApiError::ValidationError(msg),
            ServiceError::Conflict(msg) => ApiError::Conflict(msg),
            ServiceError::Storage(msg) => ApiError::DatabaseError(msg),
            ServiceError::Gateway(msg) => ApiError::ExternalServiceError(msg),
            ServiceError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),
            AuthError::TokenError(_) => ApiError::Unauthorized(err.to_string()),
            AuthError::EmailTaken => ApiError::Conflict(err.to_string()),
            AuthError::UserNotFound => ApiError::NotFound("User not found".to_string()),
            AuthError::Validation(msg) => ApiError::ValidationError(msg),
            AuthError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::DatabaseError(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::NotFound("x".to_string()).error_code(), "NOT_FOUND");
        assert_eq!(
            ApiError::SlotLimitReached("x".to_string()).error_code(),
            "SLOT_LIMIT_REACHED"
        );
        assert_eq!(ApiError::TooManyRequests.error_code(), "TOO_MANY_REQUESTS");
    }

    #[test]
    fn test_domain_errors_map_to_declines() {
        let api: ApiError = ServiceError::InsufficientInventory {
            requested: 3,
            remaining: 1,
        }
        .into();
        assert_eq!(api.status_code(), StatusCode::CONFLICT);
        assert_eq!(api.error_code(), "INSUFFICIENT_INVENTORY");
        assert!(api.to_string().contains("requested 3"));

        let api: ApiError = ServiceError::InvalidStateTransition {
            from: BookingStatus::Rejected,
            to: BookingStatus::Accepted,
        }
        .into();
        assert_eq!(api.error_code(), "INVALID_STATE_TRANSITION");
        assert!(api.to_string().contains("rejected"));

        let api: ApiError = ServiceError::ExpiredListing {
            departure_at: Utc::now(),
        }
        .into();
        assert_eq!(api.status_code(), StatusCode::GONE);

        let api: ApiError = ServiceError::PaymentVerificationFailed("unpaid".into()).into();
        assert_eq!(api.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_infrastructure_errors_map_to_server_errors() {
        let api: ApiError = ServiceError::Storage("connection reset".into()).into();
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let api: ApiError = ServiceError::Gateway("timeout".into()).into();
        assert_eq!(api.status_code(), StatusCode::BAD_GATEWAY);
    }
}
