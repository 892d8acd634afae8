//! # Vault Health Auditor
//!
//! Out-of-band self-test of the deployment: exercises the secret store end
//! to end and inspects the schema, policies, dependencies and configuration
//! around it. Each run produces a fresh [`VaultAuditReport`].
//!
//! Checks, in order:
//!
//! 1. `secret_store_capability`: backend present and usable
//! 2. `secret_round_trip`: create, fetch and delete a throwaway secret
//! 3. `credential_schema`: required columns on `provider_credentials`
//! 4. `row_level_security`: owner policies on `provider_credentials`
//! 5. `lifecycle_operations`: lifecycle repositories and audit trail respond
//! 6. `identity_provider`: identity provider reachable
//! 7. `configuration`: required settings present

pub mod auditor;
pub mod inspector;
pub mod report;

pub use auditor::{HealthTargets, VaultHealthAuditor};
pub use inspector::{
    DeploymentInspector, PgDeploymentInspector, RowSecurity, StaticDeploymentInspector,
};
pub use report::{CheckResult, CheckStatus, OverallStatus, VaultAuditReport};

/// Table holding credential records.
pub const CREDENTIAL_TABLE: &str = "provider_credentials";

/// Columns the lifecycle operations read and write.
pub const REQUIRED_CREDENTIAL_COLUMNS: &[&str] = &[
    "id",
    "owner_id",
    "provider",
    "secret_ref",
    "masked_key",
    "key_prefix",
    "key_digest",
    "status",
    "created_at",
    "last_validated_at",
    "last_used_at",
];

/// Component names used in check results.
pub mod components {
    pub const STORE_CAPABILITY: &str = "secret_store_capability";
    pub const ROUND_TRIP: &str = "secret_round_trip";
    pub const SCHEMA: &str = "credential_schema";
    pub const ROW_SECURITY: &str = "row_level_security";
    pub const LIFECYCLE: &str = "lifecycle_operations";
    pub const IDENTITY: &str = "identity_provider";
    pub const CONFIGURATION: &str = "configuration";
}
