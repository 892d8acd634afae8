//! Admin read access to the security audit trail.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use tracing::instrument;
use utoipa::IntoParams;

use super::reject_request;
use crate::api::error::{ApiError, ErrorBody};
use crate::api::state::ApiState;
use crate::audit::operations;
use crate::identity::IdentityContext;
use crate::lifecycle::AuditLogPage;

/// Query parameters for listing audit events
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogQuery {
    /// Maximum number of results (default: 50, max: 1000)
    #[param(required = false, example = 50)]
    pub limit: Option<i64>,
    /// Pagination offset (default: 0)
    #[param(required = false, example = 0)]
    pub offset: Option<i64>,
}

/// List security audit events, newest first
///
/// **Admin only**
#[utoipa::path(
    get,
    path = "/api/v1/audit-log",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Audit events retrieved", body = AuditLogPage),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Admin privileges required", body = ErrorBody),
        (status = 503, description = "Audit store unavailable", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "administration"
)]
#[instrument(skip_all, fields(user_id = identity.actor()))]
pub async fn list_audit_log_handler(
    State(state): State<ApiState>,
    Extension(identity): Extension<IdentityContext>,
    query: Result<Query<AuditLogQuery>, QueryRejection>,
) -> Result<Json<AuditLogPage>, ApiError> {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => {
            return Err(reject_request(&state, &identity, operations::AUDIT_LOG_READ, e).await)
        }
    };

    let page = state.lifecycle.audit_log(&identity, query.limit, query.offset).await?;
    Ok(Json(page))
}
