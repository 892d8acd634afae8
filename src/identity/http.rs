//! Remote token verification against a hosted auth service.
//!
//! The auth service answers `GET /auth/v1/user` for a valid session token.
//! Roles live in a `user_roles` table exposed over the service's REST
//! interface and are looked up with the service key.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::jwt::SessionClaims;
use super::{IdentityError, IdentityProvider, VerifiedIdentity};
use crate::config::IdentityConfig;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    role: String,
}

/// Verifies tokens by asking the auth service who they belong to.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: Url,
    service_key: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(
        base_url: &str,
        service_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, IdentityError> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| IdentityError::Config(format!("invalid identity URL: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url, service_key })
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            IdentityError::Config("CREDGATE_IDENTITY_URL is required in http mode".to_string())
        })?;
        Self::new(base_url, config.service_key.clone(), config.timeout())
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base_url
            .join(path)
            .map_err(|e| IdentityError::Config(format!("invalid identity endpoint: {}", e)))
    }

    fn with_api_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.service_key {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }

    /// Role lookup failures are treated as "no role".
    async fn lookup_role(&self, user_id: &str) -> Option<String> {
        let key = self.service_key.as_deref()?;
        let mut url = self.endpoint("rest/v1/user_roles").ok()?;
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{}", user_id))
            .append_pair("select", "role");

        let response = self
            .client
            .get(url)
            .header("apikey", key)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| tracing::warn!(error = %e, "Role lookup request failed"))
            .ok()?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Role lookup rejected");
            return None;
        }

        let rows: Vec<RoleRow> = response
            .json()
            .await
            .map_err(|e| tracing::warn!(error = %e, "Role lookup returned an unexpected body"))
            .ok()?;
        rows.into_iter().next().map(|row| row.role)
    }
}

/// Read `aal` from the token payload. The signature was already vouched for
/// by the auth service, so it is not checked again here.
fn token_assurance(token: &str) -> bool {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<SessionClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims.mfa_verified())
        .unwrap_or(false)
}

fn map_status(status: StatusCode) -> IdentityError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        IdentityError::InvalidToken(format!("auth service returned {}", status))
    } else {
        IdentityError::ProviderUnavailable(format!("auth service returned {}", status))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let response = self
            .with_api_key(self.client.get(self.endpoint("auth/v1/user")?))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::ProviderUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(map_status(response.status()));
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| IdentityError::ProviderUnavailable(format!("unexpected user body: {}", e)))?;

        let role = self.lookup_role(&user.id).await;
        Ok(VerifiedIdentity { user_id: user.id, role, mfa_verified: token_assurance(token) })
    }

    async fn health(&self) -> Result<String, IdentityError> {
        let response = self
            .with_api_key(self.client.get(self.endpoint("auth/v1/health")?))
            .send()
            .await
            .map_err(|e| IdentityError::ProviderUnavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(format!("auth service reachable at {}", self.base_url))
        } else {
            Err(IdentityError::ProviderUnavailable(format!(
                "auth service health returned {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HttpIdentityProvider {
        HttpIdentityProvider::new(&server.uri(), Some("service-key".into()), Duration::from_secs(2))
            .unwrap()
    }

    fn session_token(aal: &str) -> String {
        let claims = SessionClaims {
            sub: "user-1".into(),
            exp: (chrono::Utc::now().timestamp() + 600) as usize,
            aal: Some(aal.into()),
            ..Default::default()
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"remote-secret")).unwrap()
    }

    #[tokio::test]
    async fn test_verify_resolves_user_and_role() {
        let server = MockServer::start().await;
        let token = session_token("aal2");

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", format!("Bearer {}", token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "user-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/user_roles"))
            .and(query_param("user_id", "eq.user-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"role": "admin"}])))
            .mount(&server)
            .await;

        let identity = provider(&server).verify(&token).await.unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.role.as_deref(), Some("admin"));
        assert!(identity.mfa_verified);
    }

    #[tokio::test]
    async fn test_role_lookup_failure_means_no_role() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "user-2"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/user_roles"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let identity = provider(&server).verify(&session_token("aal1")).await.unwrap();
        assert_eq!(identity.role, None);
        assert!(!identity.mfa_verified);
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = provider(&server).verify("expired").await;
        assert!(matches!(result, Err(IdentityError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = provider(&server).verify("token").await;
        assert!(matches!(result, Err(IdentityError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(provider(&server).health().await.is_ok());
    }

    #[test]
    fn test_missing_base_url_is_config_error() {
        let config = IdentityConfig { mode: crate::config::IdentityMode::Http, ..Default::default() };
        assert!(matches!(
            HttpIdentityProvider::from_config(&config),
            Err(IdentityError::Config(_))
        ));
    }

    #[test]
    fn test_opaque_token_has_no_assurance() {
        assert!(!token_assurance("opaque-session-token"));
    }
}
