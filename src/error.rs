//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the
//! application. It centralizes error management and maps every failure onto
//! the API's uniform JSON envelope (`{"success": false, "message": ...}`).
//!
//! `AppError` implements `actix_web::error::ResponseError` so handlers can
//! return `Result<_, AppError>` and have actix render the right status code.
//! `From` implementations for `sqlx::Error`, `validator::ValidationErrors`,
//! `bcrypt::BcryptError`, `std::io::Error` and `serde_json::Error` allow easy
//! conversion with the `?` operator. Storage and serialization failures are
//! logged server-side and presented to clients as a generic internal error,
//! never with internal detail.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// Represents all possible errors that can occur within the application.
#[derive(Debug)]
pub enum AppError {
    /// Bad shape or invariant violation: duplicate email, missing assignee,
    /// title too short, past due date (HTTP 400).
    Validation(String),
    /// Missing/invalid/expired token or bad credentials (HTTP 401).
    Unauthorized(String),
    /// Authenticated but lacking the required role or ownership (HTTP 403).
    Forbidden(String),
    /// A requested entity id does not resolve (HTTP 404).
    NotFound(String),
    /// Request rejected by the rate limiter (HTTP 429).
    RateLimited(String),
    /// Fatal startup misconfiguration, e.g. a missing signing secret.
    /// Never produced while serving requests.
    Configuration(String),
    /// Unexpected storage/serialization failure (HTTP 500). The carried
    /// detail is logged; clients only ever see a generic message.
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl AppError {
    /// The message exposed to API clients. Internal and configuration errors
    /// are collapsed to a generic message; their detail stays in the logs.
    fn client_message(&self) -> &str {
        match self {
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::RateLimited(msg) => msg,
            AppError::Configuration(_) | AppError::Internal(_) => "Internal server error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Internal(detail) | AppError::Configuration(detail) = self {
            log::error!("{}", detail);
        }
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "message": self.client_message(),
        }))
    }
}

/// `sqlx::Error::RowNotFound` maps to `NotFound`; everything else from the
/// document engine is an internal error with the detail kept server-side.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            _ => AppError::Internal(format!("Database error: {}", error)),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::Validation(error.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::Internal(format!("Password hashing error: {}", error))
    }
}

/// File-engine I/O failures surface as internal errors.
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> AppError {
        AppError::Internal(format!("I/O error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> AppError {
        AppError::Internal(format!("Serialization error: {}", error))
    }
}
