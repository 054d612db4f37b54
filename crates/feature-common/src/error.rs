//! Error types for the feature query compiler.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using FeatureError.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// Base URI for exception type identifiers.
const EXCEPTION_BASE: &str = "http://www.opengis.net/def/exceptions/ogcapi-features-1/1.0";

/// Classification of a database-layer failure.
///
/// Transient errors (timeouts, deadlocks, lost connections) are eligible
/// for a caller-level retry; permanent errors (constraint violations,
/// syntax) never are. Classification is done by vendor error code, not
/// by message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbErrorClass {
    Transient,
    Permanent,
}

/// Primary error type for query validation, compilation and execution.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Unsupported CRS: {0}")]
    InvalidCrs(String),

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Limit out of range: {0}")]
    LimitOutOfRange(String),

    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Database error ({class:?}): {message}")]
    Database { message: String, class: DbErrorClass },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl FeatureError {
    /// Convenience constructor for parameter validation failures.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        FeatureError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            FeatureError::InvalidParameter { .. }
            | FeatureError::InvalidCrs(_)
            | FeatureError::InvalidBbox(_)
            | FeatureError::InvalidDatetime(_)
            | FeatureError::InvalidFilter(_)
            | FeatureError::LimitOutOfRange(_) => 400,

            FeatureError::NotAcceptable(_) => 406,
            FeatureError::ConcurrencyConflict(_) => 409,
            FeatureError::PayloadTooLarge(_) => 413,
            FeatureError::OperationNotSupported(_) => 501,

            FeatureError::Database { .. } | FeatureError::Internal(_) => 500,
        }
    }

    /// Get the stable exception type URI for this error kind.
    pub fn type_uri(&self) -> String {
        let slug = match self {
            FeatureError::InvalidParameter { .. } => "invalid-parameter-value",
            FeatureError::InvalidCrs(_) => "invalid-crs",
            FeatureError::InvalidBbox(_) => "invalid-bbox",
            FeatureError::InvalidDatetime(_) => "invalid-datetime",
            FeatureError::InvalidFilter(_) => "invalid-filter",
            FeatureError::LimitOutOfRange(_) => "limit-out-of-range",
            FeatureError::NotAcceptable(_) => "not-acceptable",
            FeatureError::PayloadTooLarge(_) => "payload-too-large",
            FeatureError::OperationNotSupported(_) => "operation-not-supported",
            FeatureError::ConcurrencyConflict(_) => "concurrency-conflict",
            FeatureError::Database { .. } | FeatureError::Internal(_) => "server-error",
        };
        format!("{}/{}", EXCEPTION_BASE, slug)
    }

    /// The offending parameter name, when the failure is tied to one.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            FeatureError::InvalidParameter { param, .. } => Some(param),
            _ => None,
        }
    }

    /// Convert to the wire exception payload.
    pub fn to_exception(&self) -> ExceptionDocument {
        ExceptionDocument {
            type_: self.type_uri(),
            title: Some(self.title().to_string()),
            status: Some(self.status_code()),
            detail: Some(self.to_string()),
            parameter: self.parameter().map(String::from),
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            400 => "Bad Request",
            406 => "Not Acceptable",
            409 => "Conflict",
            413 => "Payload Too Large",
            501 => "Not Implemented",
            _ => "Internal Server Error",
        }
    }

    /// Whether a caller-level retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeatureError::Database {
                class: DbErrorClass::Transient,
                ..
            }
        )
    }
}

/// RFC 7807-style exception payload produced for every failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExceptionDocument {
    /// Exception type URI.
    #[serde(rename = "type")]
    pub type_: String,

    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// HTTP status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Detailed error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Name of the offending query parameter, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}
