//! Credential lifecycle endpoints.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{parse_secret_id, reject_request};
use crate::api::error::{ApiError, ErrorBody};
use crate::api::state::ApiState;
use crate::audit::operations;
use crate::errors::GatewayError;
use crate::identity::IdentityContext;
use crate::lifecycle::{KeyValidation, RevokedKey, RotatedKey, StoredKey, UsageReport};
use crate::secrets::SecretString;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreKeyBody {
    /// Provider identifier
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "openai")]
    pub provider: String,
    /// Plaintext credential; never echoed back
    #[schema(value_type = String, format = Password)]
    pub api_key: SecretString,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RotateKeyBody {
    /// Provider identifier; must match the stored record
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "openai")]
    pub provider: String,
    /// Replacement credential; never echoed back
    #[schema(value_type = String, format = Password)]
    pub new_api_key: SecretString,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeKeyBody {
    /// Free-text reason kept with the record
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UsageQuery {
    /// Range start (RFC 3339); defaults to 30 days before the end
    #[param(required = false, example = "2026-01-01T00:00:00Z")]
    pub start_date: Option<DateTime<Utc>>,
    /// Range end (RFC 3339); defaults to now
    #[param(required = false, example = "2026-01-31T23:59:59Z")]
    pub end_date: Option<DateTime<Utc>>,
}

/// Store the caller's first credential for a provider.
#[utoipa::path(
    post,
    path = "/api/v1/keys",
    request_body = StoreKeyBody,
    responses(
        (status = 201, description = "Credential stored", body = StoredKey),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "MFA required", body = ErrorBody),
        (status = 422, description = "Invalid provider, duplicate record or insecure key", body = ErrorBody),
        (status = 503, description = "Secret store unavailable", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "keys"
)]
#[instrument(skip_all, fields(user_id = identity.actor()))]
pub async fn store_key_handler(
    State(state): State<ApiState>,
    Extension(identity): Extension<IdentityContext>,
    payload: Result<Json<StoreKeyBody>, JsonRejection>,
) -> Result<(StatusCode, Json<StoredKey>), ApiError> {
    let body = match parse_body(payload) {
        Ok(body) => body,
        Err(e) => return Err(reject_request(&state, &identity, operations::STORE, e).await),
    };

    let stored = state.lifecycle.store_key(&identity, &body.provider, body.api_key).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Replace a stored credential with a new value.
#[utoipa::path(
    post,
    path = "/api/v1/keys/{secret_id}/rotate",
    params(("secret_id" = String, Path, description = "Secret record id")),
    request_body = RotateKeyBody,
    responses(
        (status = 200, description = "Credential rotated", body = RotatedKey),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not the owner, or MFA required", body = ErrorBody),
        (status = 404, description = "No such secret", body = ErrorBody),
        (status = 422, description = "Rotation rejected", body = ErrorBody),
        (status = 503, description = "Secret store unavailable", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "keys"
)]
#[instrument(skip_all, fields(user_id = identity.actor(), secret_id = %secret_id))]
pub async fn rotate_key_handler(
    State(state): State<ApiState>,
    Extension(identity): Extension<IdentityContext>,
    Path(secret_id): Path<String>,
    payload: Result<Json<RotateKeyBody>, JsonRejection>,
) -> Result<Json<RotatedKey>, ApiError> {
    let parsed = parse_secret_id(&secret_id).and_then(|id| Ok((id, parse_body(payload)?)));
    let (secret_id, body) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return Err(reject_request(&state, &identity, operations::ROTATE, e).await),
    };

    let rotated =
        state.lifecycle.rotate(&identity, secret_id, &body.provider, body.new_api_key).await?;
    Ok(Json(rotated))
}

/// Soft-delete a credential. The record stays readable with status `revoked`.
#[utoipa::path(
    post,
    path = "/api/v1/keys/{secret_id}/revoke",
    params(("secret_id" = String, Path, description = "Secret record id")),
    request_body(content = RevokeKeyBody, description = "Optional revocation reason"),
    responses(
        (status = 200, description = "Credential revoked", body = RevokedKey),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not the owner, or MFA required", body = ErrorBody),
        (status = 404, description = "No such secret", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "keys"
)]
#[instrument(skip_all, fields(user_id = identity.actor(), secret_id = %secret_id))]
pub async fn revoke_key_handler(
    State(state): State<ApiState>,
    Extension(identity): Extension<IdentityContext>,
    Path(secret_id): Path<String>,
    body: Bytes,
) -> Result<Json<RevokedKey>, ApiError> {
    let parsed = parse_secret_id(&secret_id).and_then(|id| Ok((id, parse_revoke_body(&body)?)));
    let (secret_id, body) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return Err(reject_request(&state, &identity, operations::REVOKE, e).await),
    };

    let revoked = state.lifecycle.revoke(&identity, secret_id, body.reason).await?;
    Ok(Json(revoked))
}

/// Re-check the stored credential without returning it.
#[utoipa::path(
    post,
    path = "/api/v1/keys/{secret_id}/validate",
    params(("secret_id" = String, Path, description = "Secret record id")),
    responses(
        (status = 200, description = "Validation report", body = KeyValidation),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "No such secret", body = ErrorBody),
        (status = 503, description = "Secret store unavailable", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "keys"
)]
#[instrument(skip_all, fields(user_id = identity.actor(), secret_id = %secret_id))]
pub async fn validate_key_handler(
    State(state): State<ApiState>,
    Extension(identity): Extension<IdentityContext>,
    Path(secret_id): Path<String>,
) -> Result<Json<KeyValidation>, ApiError> {
    let secret_id = match parse_secret_id(&secret_id) {
        Ok(id) => id,
        Err(e) => return Err(reject_request(&state, &identity, operations::VALIDATE, e).await),
    };

    Ok(Json(state.lifecycle.validate(&identity, secret_id).await?))
}

/// Aggregate usage for a credential over a date range.
#[utoipa::path(
    get,
    path = "/api/v1/keys/{secret_id}/usage",
    params(("secret_id" = String, Path, description = "Secret record id"), UsageQuery),
    responses(
        (status = 200, description = "Usage report", body = UsageReport),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not the owner or an admin", body = ErrorBody),
        (status = 404, description = "No such secret", body = ErrorBody),
        (status = 422, description = "Invalid date range", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "keys"
)]
#[instrument(skip_all, fields(user_id = identity.actor(), secret_id = %secret_id))]
pub async fn usage_report_handler(
    State(state): State<ApiState>,
    Extension(identity): Extension<IdentityContext>,
    Path(secret_id): Path<String>,
    query: Result<Query<UsageQuery>, QueryRejection>,
) -> Result<Json<UsageReport>, ApiError> {
    let parsed = parse_secret_id(&secret_id)
        .and_then(|id| Ok((id, query.map_err(|e| ApiError::from(e).0)?.0)));
    let (secret_id, query) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return Err(reject_request(&state, &identity, operations::USAGE_REPORT, e).await),
    };

    let report = state
        .lifecycle
        .usage_report(&identity, secret_id, query.start_date, query.end_date)
        .await?;
    Ok(Json(report))
}

fn parse_body<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> Result<T, GatewayError> {
    let Json(body) = payload.map_err(|e| ApiError::from(e).0)?;
    body.validate()?;
    Ok(body)
}

/// An empty body means "no reason given".
fn parse_revoke_body(raw: &[u8]) -> Result<RevokeKeyBody, GatewayError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(RevokeKeyBody::default());
    }
    let body: RevokeKeyBody = serde_json::from_slice(raw)
        .map_err(|e| GatewayError::validation(format!("invalid request body: {}", e)))?;
    body.validate()?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_revoke_body_has_no_reason() {
        assert!(parse_revoke_body(b"").unwrap().reason.is_none());
        assert!(parse_revoke_body(b"  \n").unwrap().reason.is_none());
    }

    #[test]
    fn test_revoke_body_reason() {
        let body = parse_revoke_body(br#"{"reason":"leaked in CI logs"}"#).unwrap();
        assert_eq!(body.reason.as_deref(), Some("leaked in CI logs"));
    }

    #[test]
    fn test_malformed_revoke_body_is_validation_error() {
        assert!(matches!(parse_revoke_body(b"{not json"), Err(GatewayError::ValidationFailed(_))));
    }

    #[test]
    fn test_store_body_does_not_debug_plaintext() {
        let body: StoreKeyBody =
            serde_json::from_str(r#"{"provider":"openai","apiKey":"sk-live-abcdefghijklmnop"}"#)
                .unwrap();
        assert!(!format!("{:?}", body).contains("abcdefghijklmnop"));
    }
}
