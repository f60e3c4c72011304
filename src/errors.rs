use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ride::RideStatus;

/// Main error type for the campus-rides service
#[derive(Debug)]
pub enum RideShareError {
    // HTTP and API errors
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    InternalServer(String),

    // Redis errors
    RedisConnection(String),
    RedisQuery(String),

    // External service errors
    GeoResolverUnavailable(String),
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),

    // Business logic errors
    RideNotFound(String),
    PassengerNotFound(String),
    ReportNotFound(String),
    ActiveRideExists(String),
    SeatAlreadyTaken,
    DuplicateRequest,
    InvalidRideStatus { expected: String, actual: RideStatus },
    ReportAlreadyReviewed(String),
    NotRideDriver,

    // Validation errors
    ValidationFailed(Vec<ValidationError>),
    MissingRequiredField(String),
    InvalidFieldValue { field: String, value: String, reason: String },

    // Configuration errors
    MissingEnvironmentVariable(String),
    InvalidConfiguration(String),

    // Authentication errors
    TokenExpired,
    TokenInvalid,
    InsufficientPermissions,
}

/// Coarse error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    UpstreamUnavailable,
    Internal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl fmt::Display for RideShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RideShareError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            RideShareError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            RideShareError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            RideShareError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RideShareError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            RideShareError::InternalServer(msg) => write!(f, "Internal server error: {}", msg),

            RideShareError::RedisConnection(msg) => write!(f, "Redis connection error: {}", msg),
            RideShareError::RedisQuery(msg) => write!(f, "Redis query error: {}", msg),

            RideShareError::GeoResolverUnavailable(msg) => write!(f, "Geo resolver unavailable: {}", msg),
            RideShareError::NetworkTimeout => write!(f, "Network request timed out"),
            RideShareError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            RideShareError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),

            RideShareError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            RideShareError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),

            RideShareError::RideNotFound(id) => write!(f, "Ride not found: {}", id),
            RideShareError::PassengerNotFound(id) => write!(f, "Passenger request not found: {}", id),
            RideShareError::ReportNotFound(id) => write!(f, "Report not found: {}", id),
            RideShareError::ActiveRideExists(driver_id) => {
                write!(f, "Driver {} already has an active ride", driver_id)
            }
            RideShareError::SeatAlreadyTaken => write!(f, "Ride seat already taken"),
            RideShareError::DuplicateRequest => write!(f, "Passenger already requested this ride"),
            RideShareError::InvalidRideStatus { expected, actual } => {
                write!(f, "Ride must be {} but is {}", expected, actual)
            }
            RideShareError::ReportAlreadyReviewed(id) => write!(f, "Report has already been reviewed: {}", id),
            RideShareError::NotRideDriver => write!(f, "Only the ride driver can perform this action"),

            RideShareError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            RideShareError::MissingRequiredField(field) => write!(f, "Missing required field: {}", field),
            RideShareError::InvalidFieldValue { field, value, reason } => {
                write!(f, "Invalid value '{}' for field '{}': {}", value, field, reason)
            }

            RideShareError::MissingEnvironmentVariable(var) => {
                write!(f, "Missing environment variable: {}", var)
            }
            RideShareError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),

            RideShareError::TokenExpired => write!(f, "Authentication token has expired"),
            RideShareError::TokenInvalid => write!(f, "Authentication token is invalid"),
            RideShareError::InsufficientPermissions => write!(f, "Insufficient permissions for this operation"),
        }
    }
}

impl std::error::Error for RideShareError {}

impl RideShareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RideShareError::BadRequest(_)
            | RideShareError::ValidationFailed(_)
            | RideShareError::MissingRequiredField(_)
            | RideShareError::InvalidFieldValue { .. } => ErrorKind::Validation,

            RideShareError::Unauthorized(_)
            | RideShareError::TokenExpired
            | RideShareError::TokenInvalid => ErrorKind::Unauthorized,

            RideShareError::Forbidden(_)
            | RideShareError::NotRideDriver
            | RideShareError::InsufficientPermissions => ErrorKind::Forbidden,

            RideShareError::NotFound(_)
            | RideShareError::RideNotFound(_)
            | RideShareError::PassengerNotFound(_)
            | RideShareError::ReportNotFound(_) => ErrorKind::NotFound,

            RideShareError::Conflict(_)
            | RideShareError::ActiveRideExists(_)
            | RideShareError::SeatAlreadyTaken
            | RideShareError::DuplicateRequest
            | RideShareError::InvalidRideStatus { .. }
            | RideShareError::ReportAlreadyReviewed(_) => ErrorKind::Conflict,

            RideShareError::GeoResolverUnavailable(_)
            | RideShareError::NetworkTimeout
            | RideShareError::NetworkConnection(_)
            | RideShareError::HttpClient(_) => ErrorKind::UpstreamUnavailable,

            RideShareError::InternalServer(_)
            | RideShareError::RedisConnection(_)
            | RideShareError::RedisQuery(_)
            | RideShareError::JsonParsing(_)
            | RideShareError::JsonSerialization(_)
            | RideShareError::MissingEnvironmentVariable(_)
            | RideShareError::InvalidConfiguration(_) => ErrorKind::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            RideShareError::BadRequest(_) => "bad_request",
            RideShareError::Unauthorized(_) => "unauthorized",
            RideShareError::Forbidden(_) => "forbidden",
            RideShareError::NotFound(_) => "not_found",
            RideShareError::Conflict(_) => "conflict",
            RideShareError::ValidationFailed(_) => "validation_failed",
            RideShareError::MissingRequiredField(_) => "missing_field",
            RideShareError::InvalidFieldValue { .. } => "invalid_field",
            RideShareError::RideNotFound(_) => "ride_not_found",
            RideShareError::PassengerNotFound(_) => "passenger_not_found",
            RideShareError::ReportNotFound(_) => "report_not_found",
            RideShareError::ActiveRideExists(_) => "active_ride_exists",
            RideShareError::SeatAlreadyTaken => "seat_already_taken",
            RideShareError::DuplicateRequest => "duplicate_request",
            RideShareError::InvalidRideStatus { .. } => "invalid_ride_status",
            RideShareError::ReportAlreadyReviewed(_) => "report_already_reviewed",
            RideShareError::NotRideDriver => "not_ride_driver",
            RideShareError::TokenExpired => "token_expired",
            RideShareError::TokenInvalid => "token_invalid",
            RideShareError::InsufficientPermissions => "insufficient_permissions",
            RideShareError::GeoResolverUnavailable(_) => "geo_unavailable",
            RideShareError::NetworkTimeout => "network_timeout",
            _ => match self.kind() {
                ErrorKind::UpstreamUnavailable => "upstream_unavailable",
                _ => "internal_error",
            },
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RideShareError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        let error = self.error_code().to_string();

        if kind == ErrorKind::Internal {
            tracing::error!("Request failed: {}", self);
        }

        let (message, details) = match self {
            RideShareError::ValidationFailed(errors) => {
                let details = serde_json::to_value(&errors).ok();
                ("Validation errors occurred".to_string(), details)
            }
            // Internal details stay in the logs
            _ if kind == ErrorKind::Internal => ("Internal server error".to_string(), None),
            other => (other.to_string(), None),
        };

        let error_response = ErrorResponse {
            error,
            kind,
            message,
            details,
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type RideShareResult<T> = Result<T, RideShareError>;

// Conversion implementations for common error types
impl From<redis::RedisError> for RideShareError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => RideShareError::RedisConnection(err.to_string()),
            redis::ErrorKind::ResponseError => RideShareError::RedisQuery(err.to_string()),
            redis::ErrorKind::AuthenticationFailed => {
                RideShareError::RedisConnection("Authentication failed".to_string())
            }
            _ => RideShareError::RedisQuery(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for RideShareError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RideShareError::NetworkTimeout
        } else if err.is_connect() {
            RideShareError::NetworkConnection(err.to_string())
        } else {
            RideShareError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RideShareError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() {
            RideShareError::JsonParsing(err.to_string())
        } else {
            RideShareError::JsonSerialization(err.to_string())
        }
    }
}

impl From<jsonwebtoken::errors::Error> for RideShareError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => RideShareError::TokenExpired,
            _ => RideShareError::TokenInvalid,
        }
    }
}

// Helper functions for creating common errors
impl RideShareError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        RideShareError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        RideShareError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        RideShareError::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        RideShareError::Conflict(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        RideShareError::InternalServer(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        RideShareError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn ride_not_found(ride_id: impl Into<String>) -> Self {
        RideShareError::RideNotFound(ride_id.into())
    }

    pub fn passenger_not_found(passenger_id: impl Into<String>) -> Self {
        RideShareError::PassengerNotFound(passenger_id.into())
    }

    pub fn report_not_found(report_id: impl Into<String>) -> Self {
        RideShareError::ReportNotFound(report_id.into())
    }

    pub fn invalid_status(expected: impl Into<String>, actual: RideStatus) -> Self {
        RideShareError::InvalidRideStatus {
            expected: expected.into(),
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RideShareError::RideNotFound("rid-251018-a1b2c".to_string());
        assert_eq!(error.to_string(), "Ride not found: rid-251018-a1b2c");

        let error = RideShareError::invalid_status("ARRIVED", RideStatus::Started);
        assert_eq!(error.to_string(), "Ride must be ARRIVED but is STARTED");
    }

    #[test]
    fn test_validation_error() {
        let error = RideShareError::validation_error("reason", "Cancellation reason is required");
        match error {
            RideShareError::ValidationFailed(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "reason");
                assert_eq!(errors[0].message, "Cancellation reason is required");
            }
            _ => panic!("Expected ValidationFailed error"),
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(RideShareError::SeatAlreadyTaken.kind(), ErrorKind::Conflict);
        assert_eq!(RideShareError::ActiveRideExists("usr".into()).kind(), ErrorKind::Conflict);
        assert_eq!(RideShareError::NotRideDriver.kind(), ErrorKind::Forbidden);
        assert_eq!(RideShareError::bad_request("x").kind(), ErrorKind::Validation);
        assert_eq!(RideShareError::NetworkTimeout.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(RideShareError::RedisQuery("x".into()).kind(), ErrorKind::Internal);
        assert_eq!(RideShareError::passenger_not_found("p").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_status_codes() {
        let response = RideShareError::SeatAlreadyTaken.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = RideShareError::MissingRequiredField("otp".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = RideShareError::GeoResolverUnavailable("timeout".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
