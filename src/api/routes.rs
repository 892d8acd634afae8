use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

use super::{
    docs,
    handlers::{
        health_handler, list_audit_log_handler, revoke_key_handler, rotate_key_handler,
        store_key_handler, usage_report_handler, validate_key_handler, vault_health_handler,
    },
    middleware::{enforce_rate_limit, guard_caller, limit_payload, resolve_identity, track_requests},
    state::ApiState,
};
use crate::config::ServerConfig;

/// Response headers attached to every response, errors included.
const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

pub fn build_router(state: ApiState) -> Router {
    let config = state.config.server.clone();

    let api = Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/keys", post(store_key_handler))
        .route("/api/v1/keys/{secret_id}/rotate", post(rotate_key_handler))
        .route("/api/v1/keys/{secret_id}/revoke", post(revoke_key_handler))
        .route("/api/v1/keys/{secret_id}/validate", post(validate_key_handler))
        .route("/api/v1/keys/{secret_id}/usage", get(usage_report_handler))
        .route("/api/v1/audit-log", get(list_audit_log_handler))
        .route("/api/v1/vault/health", get(vault_health_handler))
        .merge(docs::docs_router());

    // Layers run bottom-up: the last one added sees the request first.
    let mut router = api
        .layer(middleware::from_fn_with_state(state.clone(), enforce_rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_identity))
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .layer(middleware::from_fn_with_state(state.clone(), limit_payload))
        .layer(middleware::from_fn_with_state(state.clone(), guard_caller))
        .with_state(state)
        .layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ));

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(*name),
            HeaderValue::from_static(*value),
        ));
    }

    router
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(86400));

    if config.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
