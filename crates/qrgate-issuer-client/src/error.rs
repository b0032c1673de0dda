//! Issuance error types.

/// Message reported when the backend gives no reason for a failure.
pub const CREATE_FAILED: &str = "create failed";

/// Errors from an issuance call.
#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        /// Endpoint being called.
        endpoint: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// The backend answered with a non-2xx status or `ok: false`.
    #[error("issuer {endpoint} returned {status}: {message}")]
    Rejected {
        /// Endpoint being called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// The body's `error` field, or `"create failed"`.
        message: String,
    },
    /// A 2xx response whose body could not be read.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        /// Endpoint being called.
        endpoint: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl IssuanceError {
    /// The message published to the UI in the failure cancel.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            Self::Http { source, .. } => source.to_string(),
            Self::Deserialization { .. } => CREATE_FAILED.to_string(),
            Self::Config(e) => e.to_string(),
        }
    }
}
