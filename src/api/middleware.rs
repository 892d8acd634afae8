//! Request guards applied ahead of every handler.
//!
//! Order, outermost first: caller deny list, payload size, identity
//! resolution, rate limit. A rejection at any stage is audited and rendered
//! through [`ApiError`].

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::AUTHORIZATION, header::ORIGIN, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{ContentLength, HeaderMapExt, UserAgent};
use tracing::{warn, Instrument};

use super::error::ApiError;
use super::state::ApiState;
use crate::audit::{operations, RiskLevel, SecurityAuditEvent, ANONYMOUS_ACTOR, SYSTEM_PROVIDER};
use crate::config::ServerConfig;
use crate::errors::{sanitize_message, GatewayError};
use crate::identity::{bearer_token, IdentityContext};
use crate::observability::MetricsRecorder;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Wrap each request in an `http_request` span and record its latency.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let span = crate::request_span!(method, request.uri().path());
    let start = Instant::now();

    let response = next.run(request).instrument(span).await;

    MetricsRecorder::new().record_http_request(
        method.as_str(),
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// Reject callers whose user agent or origin is on the deny list.
pub async fn guard_caller(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let reason = match blocked_reason(&state.config.server, request.headers()) {
        Some(reason) => reason,
        None => return Ok(next.run(request).await),
    };

    let target = RequestTarget::of(&request);
    warn!(path = %target.path, reason = %reason, "Blocked caller rejected");
    let error = GatewayError::blocked(reason);
    audit_rejection(&state, operations::BLOCKED_CALLER, ANONYMOUS_ACTOR, &target, &error, RiskLevel::High)
        .await;
    Err(error.into())
}

fn blocked_reason(server: &ServerConfig, headers: &HeaderMap) -> Option<String> {
    let user_agent = headers
        .typed_get::<UserAgent>()
        .map(|ua| ua.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    if let Some(pattern) = server
        .blocked_user_agents
        .iter()
        .find(|pattern| !pattern.is_empty() && user_agent.contains(&pattern.to_ascii_lowercase()))
    {
        return Some(format!("user agent matches '{}'", pattern));
    }

    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok())?;
    server
        .blocked_origins
        .iter()
        .find(|blocked| blocked.eq_ignore_ascii_case(origin))
        .map(|blocked| format!("origin '{}' is not allowed", blocked))
}

/// Reject requests whose declared body exceeds the configured limit.
///
/// Bodies without a `Content-Length` are capped by the body limit layer.
pub async fn limit_payload(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = state.config.server.max_body_size as u64;
    let declared = request.headers().typed_get::<ContentLength>().map(|len| len.0);

    match declared {
        Some(size) if size > limit => {
            let error = GatewayError::PayloadTooLarge { size, limit };
            audit_rejection(
                &state,
                operations::PAYLOAD_TOO_LARGE,
                ANONYMOUS_ACTOR,
                &RequestTarget::of(&request),
                &error,
                RiskLevel::Medium,
            )
            .await;
            Err(error.into())
        }
        _ => Ok(next.run(request).await),
    }
}

/// Resolve the bearer token into an [`IdentityContext`] request extension.
///
/// Never rejects: unverifiable callers continue as anonymous and fail closed
/// in operations that require a user.
pub async fn resolve_identity(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token);

    let identity = state.identity.resolve(token).await;
    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Fixed-window limit keyed on the user id, or the client address for
/// anonymous callers.
pub async fn enforce_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request.extensions().get::<IdentityContext>().cloned().unwrap_or_default();
    let (kind, identifier) = match identity.user_id.as_deref() {
        Some(user_id) => ("user", format!("user:{}", user_id)),
        None => (
            "ip",
            format!("ip:{}", client_address(&request, state.config.server.trust_forwarded_for)),
        ),
    };

    let decision = state.rate_limiter.check(&identifier).await;
    if decision.allowed {
        return Ok(next.run(request).await);
    }

    MetricsRecorder::new().record_rate_limited(kind);
    let error = GatewayError::RateLimitExceeded { retry_after_secs: decision.retry_after_secs };
    let target = RequestTarget::of(&request);
    audit_rejection(&state, operations::RATE_LIMITED, identity.actor(), &target, &error, RiskLevel::Medium)
        .await;
    Err(error.into())
}

/// The socket address, or the first `X-Forwarded-For` hop when the proxy is trusted.
fn client_address(request: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());

        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Method and path of a rejected request, detached from its body.
struct RequestTarget {
    method: String,
    path: String,
}

impl RequestTarget {
    fn of(request: &Request<Body>) -> Self {
        Self { method: request.method().to_string(), path: request.uri().path().to_string() }
    }
}

async fn audit_rejection(
    state: &ApiState,
    operation: &str,
    actor: &str,
    target: &RequestTarget,
    error: &GatewayError,
    risk: RiskLevel,
) {
    let event = SecurityAuditEvent::new(operation, SYSTEM_PROVIDER, actor)
        .with_error(error)
        .risk(risk)
        .with_metadata("method", target.method.as_str())
        .with_metadata("path", sanitize_message(&target.path));
    state.auditor.record(event).await;
    MetricsRecorder::new().record_operation(operation, error.code());
}
