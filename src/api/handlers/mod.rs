//! HTTP request handlers organized by resource type

pub mod audit_log;
pub mod health;
pub mod keys;
pub mod vault;

pub use audit_log::list_audit_log_handler;
pub use health::health_handler;
pub use keys::{
    revoke_key_handler, rotate_key_handler, store_key_handler, usage_report_handler,
    validate_key_handler,
};
pub use vault::vault_health_handler;

use uuid::Uuid;

use super::error::ApiError;
use super::state::ApiState;
use crate::audit::{RiskLevel, SecurityAuditEvent, SYSTEM_PROVIDER};
use crate::errors::GatewayError;
use crate::identity::IdentityContext;
use crate::observability::MetricsRecorder;

/// Audit a request that failed before reaching its operation (malformed body,
/// path or query) and convert the failure for the response.
pub(crate) async fn reject_request(
    state: &ApiState,
    identity: &IdentityContext,
    operation: &str,
    error: impl Into<ApiError>,
) -> ApiError {
    let ApiError(error) = error.into();
    let event = SecurityAuditEvent::new(operation, SYSTEM_PROVIDER, identity.actor())
        .with_error(&error)
        .risk(RiskLevel::Medium);
    state.auditor.record(event).await;
    MetricsRecorder::new().record_operation(operation, error.code());
    ApiError(error)
}

/// Secret ids that do not parse cannot name a stored record.
pub(crate) fn parse_secret_id(raw: &str) -> Result<Uuid, GatewayError> {
    Uuid::parse_str(raw).map_err(|_| GatewayError::not_found(format!("secret {} not found", raw)))
}
