//! End-to-end router tests over in-memory backends.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

use credgate::api::{build_router, ApiState, Backends};
use credgate::config::{AppConfig, SecretBackend};
use credgate::identity::jwt::SessionClaims;

const JWT_SECRET: &str = "credgate-integration-signing-secret-0123456789";
const OPENAI_KEY: &str = "sk-proj-4fJ9qLm2Xc7Rt1Vb8Nz3Kp6Wd0Hs5Ya2Ue9Gi4Oc";
const OPENAI_KEY_ROTATED: &str = "sk-proj-7Hq2Wn5Ez8Ty1Ua4Sd6Fg9Jk3Lx0Cv2Bn5Mq8Pr";

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.identity.jwt_secret = Some(JWT_SECRET.to_string());
    config.secret_store.backend = SecretBackend::Memory;
    config.rate_limit.max_requests = 1000;
    config
}

fn server_with(config: AppConfig) -> TestServer {
    let state = ApiState::with_backends(config, Backends::in_memory()).unwrap();
    TestServer::new(build_router(state)).unwrap()
}

fn server() -> TestServer {
    server_with(test_config())
}

fn token(config: &AppConfig, user_id: &str, role: Option<&str>) -> String {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        role: role.map(str::to_string),
        aal: Some("aal1".to_string()),
        ..Default::default()
    };
    let secret = config.identity.jwt_secret.as_deref().unwrap();
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

fn user_token(user_id: &str) -> String {
    token(&test_config(), user_id, None)
}

fn admin_token() -> String {
    token(&test_config(), "admin-1", Some("admin"))
}

async fn store_key(server: &TestServer, user_id: &str) -> String {
    let response = server
        .post("/api/v1/keys")
        .authorization_bearer(user_token(user_id))
        .json(&json!({ "provider": "openai", "apiKey": OPENAI_KEY }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    body["secretId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public_and_carries_security_headers() {
    let server = server();
    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(
        headers.get("strict-transport-security").unwrap(),
        "max-age=31536000; includeSubDomains"
    );
    assert_eq!(headers.get("referrer-policy").unwrap(), "strict-origin-when-cross-origin");
    assert!(headers.get("content-type").unwrap().to_str().unwrap().starts_with("application/json"));
}

#[tokio::test]
async fn error_responses_carry_security_headers_and_code() {
    let server = server();
    let response = server
        .post("/api/v1/keys")
        .json(&json!({ "provider": "openai", "apiKey": OPENAI_KEY }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "authentication_failed");
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

#[tokio::test]
async fn store_returns_masked_key_only() {
    let server = server();
    let response = server
        .post("/api/v1/keys")
        .authorization_bearer(user_token("user-1"))
        .json(&json!({ "provider": "openai", "apiKey": OPENAI_KEY }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let text = response.text();
    assert!(!text.contains(OPENAI_KEY));

    let body: Value = serde_json::from_str(&text).unwrap();
    let masked = body["maskedKey"].as_str().unwrap();
    assert!(masked.starts_with("sk-p"));
    assert!(masked.ends_with(&OPENAI_KEY[OPENAI_KEY.len() - 4..]));
}

#[tokio::test]
async fn malformed_body_is_unprocessable() {
    let server = server();
    let response = server
        .post("/api/v1/keys")
        .authorization_bearer(user_token("user-1"))
        .json(&json!({ "provider": "openai" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["error"], "validation_failed");
}

#[tokio::test]
async fn rotate_changes_mask_for_owner_only() {
    let server = server();
    let secret_id = store_key(&server, "user-1").await;

    let denied = server
        .post(&format!("/api/v1/keys/{}/rotate", secret_id))
        .authorization_bearer(user_token("user-2"))
        .json(&json!({ "provider": "openai", "newApiKey": OPENAI_KEY_ROTATED }))
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(denied.json::<Value>()["error"], "authorization_failed");

    let rotated = server
        .post(&format!("/api/v1/keys/{}/rotate", secret_id))
        .authorization_bearer(user_token("user-1"))
        .json(&json!({ "provider": "openai", "newApiKey": OPENAI_KEY_ROTATED }))
        .await;
    assert_eq!(rotated.status_code(), StatusCode::OK);
    let body: Value = rotated.json();
    assert_eq!(body["secretId"], secret_id.as_str());
    assert!(body["maskedKey"].as_str().unwrap().ends_with(&OPENAI_KEY_ROTATED[OPENAI_KEY_ROTATED.len() - 4..]));
}

#[tokio::test]
async fn revoke_keeps_record_and_blocks_validation() {
    let server = server();
    let secret_id = store_key(&server, "user-1").await;

    let revoked = server
        .post(&format!("/api/v1/keys/{}/revoke", secret_id))
        .authorization_bearer(user_token("user-1"))
        .json(&json!({ "reason": "leaked" }))
        .await;
    assert_eq!(revoked.status_code(), StatusCode::OK);
    assert!(revoked.json::<Value>()["revokedAt"].is_string());

    let again = server
        .post(&format!("/api/v1/keys/{}/revoke", secret_id))
        .authorization_bearer(user_token("user-1"))
        .await;
    assert_eq!(again.status_code(), StatusCode::OK);

    let validate = server
        .post(&format!("/api/v1/keys/{}/validate", secret_id))
        .authorization_bearer(user_token("user-1"))
        .await;
    assert_eq!(validate.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn validate_reports_key_info_without_plaintext() {
    let server = server();
    let secret_id = store_key(&server, "user-1").await;

    let response = server
        .post(&format!("/api/v1/keys/{}/validate", secret_id))
        .authorization_bearer(user_token("user-1"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    assert!(!text.contains(OPENAI_KEY));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["keyInfo"]["provider"], "openai");
    assert_eq!(body["keyInfo"]["isActive"], true);
}

#[tokio::test]
async fn unknown_or_malformed_secret_id_is_not_found() {
    let server = server();

    let malformed = server
        .post("/api/v1/keys/not-a-uuid/validate")
        .authorization_bearer(user_token("user-1"))
        .await;
    assert_eq!(malformed.status_code(), StatusCode::NOT_FOUND);

    let unknown = server
        .post(&format!("/api/v1/keys/{}/validate", uuid::Uuid::new_v4()))
        .authorization_bearer(user_token("user-1"))
        .await;
    assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn usage_report_for_owner_and_admin() {
    let server = server();
    let secret_id = store_key(&server, "user-1").await;
    let path = format!("/api/v1/keys/{}/usage", secret_id);

    let owner = server.get(&path).authorization_bearer(user_token("user-1")).await;
    assert_eq!(owner.status_code(), StatusCode::OK);
    let body: Value = owner.json();
    assert_eq!(body["totalRequests"], 0);
    assert_eq!(body["details"].as_array().unwrap().len(), 0);

    let admin = server.get(&path).authorization_bearer(admin_token()).await;
    assert_eq!(admin.status_code(), StatusCode::OK);

    let other = server.get(&path).authorization_bearer(user_token("user-2")).await;
    assert_eq!(other.status_code(), StatusCode::FORBIDDEN);

    let inverted = server
        .get(&path)
        .add_query_param("startDate", "2026-02-01T00:00:00Z")
        .add_query_param("endDate", "2026-01-01T00:00:00Z")
        .authorization_bearer(user_token("user-1"))
        .await;
    assert_eq!(inverted.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn audit_log_is_admin_only() {
    let server = server();
    store_key(&server, "user-1").await;

    let user = server.get("/api/v1/audit-log").authorization_bearer(user_token("user-1")).await;
    assert_eq!(user.status_code(), StatusCode::FORBIDDEN);

    let admin = server
        .get("/api/v1/audit-log")
        .add_query_param("limit", 10)
        .authorization_bearer(admin_token())
        .await;
    assert_eq!(admin.status_code(), StatusCode::OK);

    let body: Value = admin.json();
    assert_eq!(body["pagination"]["limit"], 10);
    let entries = body["entries"].as_array().unwrap();
    assert!(entries.iter().any(|e| e["operation"] == "store" && e["success"] == true));
    assert!(entries.iter().any(|e| e["operation"] == "audit_log_read" && e["success"] == false));
    assert!(!body.to_string().contains(OPENAI_KEY));
}

#[tokio::test]
async fn vault_health_requires_admin() {
    let server = server();

    let user = server.get("/api/v1/vault/health").authorization_bearer(user_token("user-1")).await;
    assert_eq!(user.status_code(), StatusCode::FORBIDDEN);

    let admin = server.get("/api/v1/vault/health").authorization_bearer(admin_token()).await;
    assert_eq!(admin.status_code(), StatusCode::OK);
    let body: Value = admin.json();
    // The in-memory store is flagged as non-durable.
    assert_eq!(body["overall_status"], "degraded");
    assert_eq!(body["checks"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn invalid_token_is_treated_as_anonymous() {
    let server = server();

    let health = server.get("/health").authorization_bearer("garbage.token.value").await;
    assert_eq!(health.status_code(), StatusCode::OK);

    let store = server
        .post("/api/v1/keys")
        .authorization_bearer("garbage.token.value")
        .json(&json!({ "provider": "openai", "apiKey": OPENAI_KEY }))
        .await;
    assert_eq!(store.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blocked_user_agent_is_rejected() {
    let server = server();
    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("user-agent"),
            HeaderValue::from_static("sqlmap/1.7.2#stable"),
        )
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["error"], "blocked_caller");
}

#[tokio::test]
async fn rate_limit_denies_after_threshold() {
    let mut config = test_config();
    config.rate_limit.max_requests = 3;
    config.server.trust_forwarded_for = true;
    let server = server_with(config);

    for _ in 0..3 {
        let response = server
            .get("/health")
            .add_header(
                HeaderName::from_static("x-forwarded-for"),
                HeaderValue::from_static("203.0.113.9"),
            )
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let limited = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("203.0.113.9"),
        )
        .await;
    assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().get("retry-after").is_some());
    assert_eq!(limited.json::<Value>()["error"], "rate_limit_exceeded");

    let other_client = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("198.51.100.4"),
        )
        .await;
    assert_eq!(other_client.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn spoofed_forwarded_for_does_not_reset_budget() {
    let mut config = test_config();
    config.rate_limit.max_requests = 3;
    let server = server_with(config);

    for hop in ["203.0.113.1", "203.0.113.2", "203.0.113.3"] {
        let response = server
            .get("/health")
            .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static(hop))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let limited = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("203.0.113.4"),
        )
        .await;
    assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let mut config = test_config();
    config.server.max_body_size = 1024;
    let server = server_with(config);

    let response = server
        .post("/api/v1/keys")
        .authorization_bearer(user_token("user-1"))
        .json(&json!({ "provider": "openai", "apiKey": "x".repeat(4096) }))
        .await;

    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let server = server();
    let response = server
        .method(axum::http::Method::OPTIONS, "/api/v1/keys")
        .add_header(
            HeaderName::from_static("origin"),
            HeaderValue::from_static("https://app.example"),
        )
        .add_header(
            HeaderName::from_static("access-control-request-method"),
            HeaderValue::from_static("POST"),
        )
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.headers().get("access-control-allow-origin").is_some());
}

#[tokio::test]
async fn openapi_document_is_served() {
    let server = server();
    let response = server.get("/api-docs/openapi.json").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert!(body["paths"]["/api/v1/keys/{secret_id}/rotate"].is_object());
}

#[tokio::test]
async fn gateway_without_signing_secret_does_not_start() {
    let mut config = AppConfig::default();
    config.secret_store.backend = SecretBackend::Memory;
    assert!(config.identity.jwt_secret.is_none());
    assert!(ApiState::with_backends(config, Backends::in_memory()).is_err());
}

#[tokio::test]
async fn admin_token_signed_with_another_secret_is_rejected() {
    let server = server();
    let mut forged = test_config();
    forged.identity.jwt_secret = Some("credgate-development-secret-change-me-now".to_string());

    let response = server
        .get("/api/v1/audit-log")
        .authorization_bearer(token(&forged, "attacker", Some("admin")))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "authentication_failed");
}
