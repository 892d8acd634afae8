use axum::{routing::get, Json, Router};
use utoipa::{Modify, OpenApi};

use crate::api::error::ErrorBody;
use crate::api::handlers::health::HealthResponse;
use crate::api::handlers::keys::{RevokeKeyBody, RotateKeyBody, StoreKeyBody};
use crate::audit::{RiskLevel, SecurityAuditEvent};
use crate::lifecycle::{
    AuditLogPage, KeyInfo, KeyStatus, KeyValidation, Pagination, RevokedKey, RotatedKey,
    StoredKey, UsageRecord, UsageReport,
};
use crate::validation::{SecurityReport, SecurityWarning, WarningKind};
use crate::vault_audit::{CheckResult, CheckStatus, OverallStatus, VaultAuditReport};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health_handler,
        crate::api::handlers::keys::store_key_handler,
        crate::api::handlers::keys::rotate_key_handler,
        crate::api::handlers::keys::revoke_key_handler,
        crate::api::handlers::keys::validate_key_handler,
        crate::api::handlers::keys::usage_report_handler,
        crate::api::handlers::audit_log::list_audit_log_handler,
        crate::api::handlers::vault::vault_health_handler,
    ),
    components(
        schemas(
            ErrorBody,
            HealthResponse,
            StoreKeyBody,
            RotateKeyBody,
            RevokeKeyBody,
            StoredKey,
            RotatedKey,
            RevokedKey,
            KeyInfo,
            KeyStatus,
            KeyValidation,
            SecurityReport,
            SecurityWarning,
            WarningKind,
            UsageRecord,
            UsageReport,
            Pagination,
            AuditLogPage,
            SecurityAuditEvent,
            RiskLevel,
            VaultAuditReport,
            CheckResult,
            CheckStatus,
            OverallStatus
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness"),
        (name = "keys", description = "Provider credential lifecycle"),
        (name = "administration", description = "Audit trail and vault health (admin only)")
    ),
    info(
        title = "credgate",
        description = "Secret lifecycle and access-control gateway for AI provider credentials"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build(),
            ),
        );
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn docs_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}
