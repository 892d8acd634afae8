//! Local verification of HS256 session tokens.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::{IdentityError, IdentityProvider, VerifiedIdentity};
use crate::config::IdentityConfig;

/// Authenticator assurance level that indicates a completed MFA challenge.
pub const MFA_AAL: &str = "aal2";

/// Session token claims read by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: Option<AppMetadata>,
    #[serde(default)]
    pub aal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppMetadata {
    #[serde(default)]
    pub role: Option<String>,
}

impl SessionClaims {
    /// `app_metadata.role` when present, else the top-level `role` claim.
    pub fn effective_role(&self) -> Option<String> {
        self.app_metadata.as_ref().and_then(|m| m.role.clone()).or_else(|| self.role.clone())
    }

    pub fn mfa_verified(&self) -> bool {
        self.aal.as_deref() == Some(MFA_AAL)
    }
}

/// Verifies session tokens with a shared HS256 secret.
pub struct JwtIdentityProvider {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self { decoding_key: DecodingKey::from_secret(secret), validation }
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let secret = config
            .jwt_secret
            .as_deref()
            .ok_or_else(|| IdentityError::Config("CREDGATE_JWT_SECRET is not set".to_string()))?;
        Ok(Self::new(secret.as_bytes()))
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    fn name(&self) -> &'static str {
        "jwt"
    }

    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;
        let claims = data.claims;

        if claims.sub.trim().is_empty() {
            return Err(IdentityError::InvalidToken("token has an empty subject".to_string()));
        }

        Ok(VerifiedIdentity {
            role: claims.effective_role(),
            mfa_verified: claims.mfa_verified(),
            user_id: claims.sub,
        })
    }

    async fn health(&self) -> Result<String, IdentityError> {
        Ok("tokens verified locally with HS256".to_string())
    }
}
