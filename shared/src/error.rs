//! Error types for Instructor Portal Lambda functions.

use thiserror::Error;

use crate::jsonapi::JsonApiError;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Instructor Portal Lambda functions.
#[derive(Error, Debug)]
pub enum Error {
    /// Response document could not be built
    #[error("{0}")]
    JsonApi(#[from] JsonApiError),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication error (token could not be verified)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Request carries no usable credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Malformed ARN
    #[error("{0}")]
    InvalidArn(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Outbound HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::JsonApi(_) => 400,
            Error::Auth(_) => 401,
            Error::Unauthorized(_) => 403,
            Error::NotFound(_) => 404,
            _ => 500,
        }
    }
}
