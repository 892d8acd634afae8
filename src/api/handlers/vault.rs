//! On-demand vault health audit.

use axum::{extract::State, Extension, Json};
use tracing::instrument;

use crate::api::error::{ApiError, ErrorBody};
use crate::api::state::ApiState;
use crate::identity::IdentityContext;
use crate::vault_audit::VaultAuditReport;

/// Run the vault health battery and return the report
///
/// A `critical` report is still a `200`: the request succeeded, the
/// deployment did not.
///
/// **Admin only**
#[utoipa::path(
    get,
    path = "/api/v1/vault/health",
    responses(
        (status = 200, description = "Health report", body = VaultAuditReport),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Admin privileges required", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "administration"
)]
#[instrument(skip_all, fields(user_id = identity.actor()))]
pub async fn vault_health_handler(
    State(state): State<ApiState>,
    Extension(identity): Extension<IdentityContext>,
) -> Result<Json<VaultAuditReport>, ApiError> {
    Ok(Json(state.vault_auditor.run_as(&identity).await?))
}
