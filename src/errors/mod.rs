//! # Error Handling
//!
//! Crate-wide error taxonomy for the credential gateway. Every failure that
//! leaves the subsystem is one of these kinds, carries a stable external code,
//! and has already been passed through [`sanitize::sanitize_message`].

pub mod sanitize;

pub use sanitize::sanitize_message;

/// Custom result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the credential gateway
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Caller matched the user-agent or origin deny list
    #[error("Blocked caller: {0}")]
    BlockedCaller(String),

    /// Request body exceeds the configured limit
    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// Caller exhausted its request window
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// Bearer credential missing or rejected by the identity provider
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Wrong owner or insufficient privilege
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// No such secret
    #[error("Not found: {0}")]
    NotFound(String),

    /// Secret backend or database unreachable or erroring
    #[error("Secret store unavailable: {0}")]
    StoreUnavailable(String),

    /// Credential shape or policy check blocked the operation
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn blocked<S: Into<String>>(message: S) -> Self {
        Self::BlockedCaller(message.into())
    }

    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::AuthenticationFailed(message.into())
    }

    pub fn authorization<S: Into<String>>(message: S) -> Self {
        Self::AuthorizationFailed(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn store_unavailable<S: Into<String>>(message: S) -> Self {
        Self::StoreUnavailable(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::ValidationFailed(message.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Stable, externally visible error code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::BlockedCaller(_) => "blocked_caller",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GatewayError::AuthenticationFailed(_) => "authentication_failed",
            GatewayError::AuthorizationFailed(_) => "authorization_failed",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::StoreUnavailable(_) => "store_unavailable",
            GatewayError::ValidationFailed(_) => "validation_failed",
            GatewayError::Config(_) => "configuration_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status code returned at the boundary
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BlockedCaller(_) => 403,
            GatewayError::PayloadTooLarge { .. } => 413,
            GatewayError::RateLimitExceeded { .. } => 429,
            GatewayError::AuthenticationFailed(_) => 401,
            GatewayError::AuthorizationFailed(_) => 403,
            GatewayError::NotFound(_) => 404,
            GatewayError::StoreUnavailable(_) => 503,
            GatewayError::ValidationFailed(_) => 422,
            GatewayError::Config(_) | GatewayError::Internal(_) => 500,
        }
    }

    /// Message with credential-shaped content redacted.
    pub fn sanitized_message(&self) -> String {
        sanitize_message(&self.to_string())
    }
}

impl From<crate::secrets::SecretsError> for GatewayError {
    fn from(error: crate::secrets::SecretsError) -> Self {
        use crate::secrets::SecretsError;
        match error {
            SecretsError::NotFound { reference } => {
                GatewayError::not_found(format!("secret reference {} not found", reference))
            }
            SecretsError::ConfigError { message } => GatewayError::config(message),
            other => GatewayError::store_unavailable(sanitize_message(&other.to_string())),
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => GatewayError::not_found("row not found"),
            other => {
                tracing::error!(error = %sanitize_message(&other.to_string()), "database operation failed");
                GatewayError::store_unavailable("database operation failed")
            }
        }
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(message)
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(error: std::io::Error) -> Self {
        Self::internal(format!("I/O error: {}", error))
    }
}
