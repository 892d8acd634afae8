//! Error types for secret store operations.

use thiserror::Error;

/// Result type for secret store operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while talking to a secret store backend.
///
/// Messages never contain secret values; callers still pass them through the
/// sanitizer before they leave the gateway.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// No secret exists under the given reference.
    #[error("Secret not found: {reference}")]
    NotFound { reference: String },

    /// Backend unreachable or returned a server-side failure.
    #[error("Secret store unavailable: {message}")]
    Unavailable { message: String },

    /// Backend did not answer within the configured bound.
    #[error("Secret store timed out during {operation} after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Invalid secret name.
    #[error("Invalid secret name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Backend-specific error.
    #[error("Backend error: {message}")]
    BackendError { message: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl SecretsError {
    /// Create a not found error.
    pub fn not_found(reference: impl Into<String>) -> Self {
        Self::NotFound { reference: reference.into() }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), after_ms }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into(), reason: reason.into() }
    }

    /// Create a backend error.
    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::BackendError { message: message.into() }
    }

    /// Create a config error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }
}

impl From<sqlx::Error> for SecretsError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => SecretsError::unavailable("connection pool timed out"),
            sqlx::Error::Database(db_err) => {
                SecretsError::backend_error(format!("database rejected vault call: {}", db_err.message()))
            }
            other => SecretsError::unavailable(other.to_string()),
        }
    }
}
