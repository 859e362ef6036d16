//! REST client error types.

use thiserror::Error;

/// Errors returned by the management API client.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure, non-2xx status or undecodable response.
    #[error("VAST API error: {0}")]
    Api(String),

    /// A record lacks a field the caller relies on.
    #[error("record has no field '{0}'")]
    MissingField(String),

    /// A record field is present but has the wrong JSON type.
    #[error("record field '{field}' is not {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Api(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Api(format!("invalid JSON in response: {}", err))
    }
}

/// Result type for REST client operations.
pub type Result<T> = std::result::Result<T, Error>;
