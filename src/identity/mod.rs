//! Identity Resolver.
//!
//! Turns a bearer credential into an [`IdentityContext`]. Verification
//! failures never raise: they degrade to the anonymous context, and the
//! operations that need a caller check `is_authenticated` and fail closed.

pub mod http;
pub mod jwt;

pub use http::HttpIdentityProvider;
pub use jwt::JwtIdentityProvider;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{IdentityConfig, IdentityMode};
use crate::errors::{sanitize_message, GatewayError};

/// Errors raised by an identity provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("bearer token rejected: {0}")]
    InvalidToken(String),

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("identity configuration error: {0}")]
    Config(String),
}

impl From<IdentityError> for GatewayError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::InvalidToken(msg) => GatewayError::authentication(sanitize_message(&msg)),
            IdentityError::ProviderUnavailable(msg) => {
                GatewayError::store_unavailable(sanitize_message(&msg))
            }
            IdentityError::Config(msg) => GatewayError::config(msg),
        }
    }
}

/// What a provider learned about a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub role: Option<String>,
    pub mfa_verified: bool,
}

/// Verifies bearer tokens against an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;

    /// Reachability check; returns a short description on success.
    async fn health(&self) -> Result<String, IdentityError>;
}

/// The caller as seen by every downstream component.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentityContext {
    pub user_id: Option<String>,
    pub is_authenticated: bool,
    pub is_admin: bool,
    pub mfa_verified: bool,
}

impl IdentityContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self { user_id: Some(user_id.into()), is_authenticated: true, ..Default::default() }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self { is_admin: true, ..Self::user(user_id) }
    }

    pub fn with_mfa(mut self) -> Self {
        self.mfa_verified = true;
        self
    }

    /// Acting user id, or `AuthenticationFailed` for anonymous callers.
    pub fn require_user(&self) -> crate::errors::Result<&str> {
        match (&self.user_id, self.is_authenticated) {
            (Some(user_id), true) => Ok(user_id),
            _ => Err(GatewayError::authentication("a valid bearer token is required")),
        }
    }

    /// Name recorded in audit events.
    pub fn actor(&self) -> &str {
        self.user_id.as_deref().unwrap_or(crate::audit::ANONYMOUS_ACTOR)
    }
}

/// Resolves bearer tokens to identity contexts.
#[derive(Clone)]
pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
    admin_role: String,
}

impl IdentityResolver {
    pub fn new(provider: Arc<dyn IdentityProvider>, admin_role: impl Into<String>) -> Self {
        Self { provider, admin_role: admin_role.into() }
    }

    /// Build the provider selected by `config.mode`.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let provider: Arc<dyn IdentityProvider> = match config.mode {
            IdentityMode::Http => Arc::new(HttpIdentityProvider::from_config(config)?),
            IdentityMode::Jwt => Arc::new(JwtIdentityProvider::from_config(config)?),
        };
        Ok(Self::new(provider, config.admin_role.clone()))
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Resolve `bearer` (the token without the `Bearer ` prefix).
    pub async fn resolve(&self, bearer: Option<&str>) -> IdentityContext {
        let token = match bearer.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return IdentityContext::anonymous(),
        };

        match self.provider.verify(token).await {
            Ok(identity) => {
                let is_admin = identity.role.as_deref() == Some(self.admin_role.as_str());
                tracing::debug!(
                    user_id = %identity.user_id,
                    is_admin,
                    mfa_verified = identity.mfa_verified,
                    "Resolved caller identity"
                );
                IdentityContext {
                    user_id: Some(identity.user_id),
                    is_authenticated: true,
                    is_admin,
                    mfa_verified: identity.mfa_verified,
                }
            }
            Err(e) => {
                tracing::info!(
                    provider = self.provider.name(),
                    error = %sanitize_message(&e.to_string()),
                    "Bearer token not verified, continuing as anonymous"
                );
                IdentityContext::anonymous()
            }
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}
