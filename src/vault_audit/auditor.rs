//! Vault Health Auditor: an ordered battery of deployment self-checks.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::inspector::DeploymentInspector;
use super::report::{CheckResult, CheckStatus, OverallStatus, VaultAuditReport};
use super::{components, CREDENTIAL_TABLE, REQUIRED_CREDENTIAL_COLUMNS};
use crate::audit::{operations, RiskLevel, SecurityAuditEvent, SecurityAuditor, SYSTEM_PROVIDER};
use crate::config::AppConfig;
use crate::errors::{sanitize_message, GatewayError, Result};
use crate::identity::{IdentityContext, IdentityProvider};
use crate::lifecycle::{SecretRecordRepository, UsageRepository};
use crate::observability::MetricsRecorder;
use crate::secrets::{SecretStore, SecretString};

const PROBE_VALUE_LEN: usize = 48;

/// Collaborators exercised by the health checks.
#[derive(Clone)]
pub struct HealthTargets {
    pub store: Arc<dyn SecretStore>,
    pub inspector: Arc<dyn DeploymentInspector>,
    pub records: Arc<dyn SecretRecordRepository>,
    pub usage: Arc<dyn UsageRepository>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Runs the health battery and records each run in the audit trail.
///
/// The only data it writes is its own throwaway probe secret, which it always
/// tries to delete again.
pub struct VaultHealthAuditor {
    targets: HealthTargets,
    auditor: Arc<SecurityAuditor>,
    config: Arc<AppConfig>,
    metrics: MetricsRecorder,
}

impl VaultHealthAuditor {
    pub fn new(targets: HealthTargets, auditor: Arc<SecurityAuditor>, config: Arc<AppConfig>) -> Self {
        Self { targets, auditor, config, metrics: MetricsRecorder::new() }
    }

    /// Run on behalf of `identity`, which must be an authenticated admin.
    pub async fn run_as(&self, identity: &IdentityContext) -> Result<VaultAuditReport> {
        let denied = match (identity.require_user(), identity.is_admin) {
            (Err(e), _) => Some(e),
            (Ok(_), false) => Some(GatewayError::authorization("administrator privileges required")),
            (Ok(_), true) => None,
        };

        if let Some(error) = denied {
            let event =
                SecurityAuditEvent::new(operations::VAULT_HEALTH_CHECK, SYSTEM_PROVIDER, identity.actor())
                    .with_error(&error)
                    .risk(RiskLevel::High);
            self.auditor.record(event).await;
            self.metrics.record_operation(operations::VAULT_HEALTH_CHECK, error.code());
            return Err(error);
        }

        Ok(self.run(identity.actor()).await)
    }

    /// Run every check in order, continuing past failures.
    #[instrument(skip(self))]
    pub async fn run(&self, actor: &str) -> VaultAuditReport {
        let checks = vec![
            self.check_store_capability().await,
            self.check_round_trip().await,
            self.check_schema().await,
            self.check_row_security().await,
            self.check_lifecycle().await,
            self.check_identity().await,
            self.check_configuration(),
        ];

        let overall_status = OverallStatus::from_checks(&checks);
        let recommendations = checks
            .iter()
            .filter(|c| c.status != CheckStatus::Pass)
            .filter_map(|c| recommendation_for(&c.component, c.status))
            .map(str::to_string)
            .collect();

        let report =
            VaultAuditReport { overall_status, timestamp: Utc::now(), checks, recommendations };
        self.record_run(actor, &report).await;
        report
    }

    async fn record_run(&self, actor: &str, report: &VaultAuditReport) {
        let failed: Vec<&str> = report.failed().map(|c| c.component.as_str()).collect();
        let warned: Vec<&str> = report.warnings().map(|c| c.component.as_str()).collect();

        let risk = match report.overall_status {
            OverallStatus::Healthy => RiskLevel::Low,
            OverallStatus::Degraded => RiskLevel::Medium,
            OverallStatus::Critical => RiskLevel::High,
        };

        let event = SecurityAuditEvent::new(operations::VAULT_HEALTH_CHECK, SYSTEM_PROVIDER, actor)
            .success(report.overall_status != OverallStatus::Critical)
            .risk(risk)
            .with_metadata("overall_status", report.overall_status.as_str())
            .with_metadata("failed_checks", failed.clone())
            .with_metadata("warning_checks", warned);
        self.auditor.record(event).await;

        self.metrics.record_vault_audit(report.overall_status.as_str());
        self.metrics.record_operation(operations::VAULT_HEALTH_CHECK, report.overall_status.as_str());

        if failed.is_empty() {
            info!(overall_status = %report.overall_status, "Vault health audit completed");
        } else {
            warn!(overall_status = %report.overall_status, failed = ?failed, "Vault health audit found failures");
        }
    }

    /// (a) store backend present and usable
    async fn check_store_capability(&self) -> CheckResult {
        let backend = self.targets.store.backend_name();
        match self.targets.store.probe().await {
            Ok(description) if backend == "memory" => CheckResult::warning(
                components::STORE_CAPABILITY,
                "in-memory secret store is not durable",
            )
            .with_details(json!({ "backend": backend, "probe": description })),
            Ok(description) => {
                CheckResult::pass(components::STORE_CAPABILITY, description)
                    .with_details(json!({ "backend": backend }))
            }
            Err(e) => CheckResult::fail(
                components::STORE_CAPABILITY,
                sanitize_message(&e.to_string()),
            )
            .with_details(json!({ "backend": backend })),
        }
    }

    /// (b) create, fetch and delete a throwaway secret
    async fn check_round_trip(&self) -> CheckResult {
        let name = format!("credgate_health_probe_{}", Uuid::new_v4().simple());
        let value: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PROBE_VALUE_LEN)
            .map(char::from)
            .collect();
        let probe = SecretString::new(value);

        let reference = match self.targets.store.create(&name, &probe).await {
            Ok(reference) => reference,
            Err(e) => {
                return CheckResult::fail(
                    components::ROUND_TRIP,
                    format!("create failed: {}", sanitize_message(&e.to_string())),
                )
            }
        };

        let result = match self.targets.store.fetch(&reference).await {
            Ok(fetched) if fetched == probe => {
                CheckResult::pass(components::ROUND_TRIP, "create, fetch and delete round trip succeeded")
            }
            Ok(_) => CheckResult::fail(
                components::ROUND_TRIP,
                "fetched value does not match the value written",
            ),
            Err(e) => CheckResult::fail(
                components::ROUND_TRIP,
                format!("fetch failed: {}", sanitize_message(&e.to_string())),
            ),
        };

        match self.targets.store.delete(&reference).await {
            Ok(()) => result.with_details(json!({ "cleanup": "deleted" })),
            Err(e) => {
                warn!(
                    reference = %reference,
                    error = %sanitize_message(&e.to_string()),
                    "Failed to delete health probe secret"
                );
                result.with_details(json!({ "cleanup": "failed", "reference": reference.as_str() }))
            }
        }
    }

    /// (c) credential table has every required column
    async fn check_schema(&self) -> CheckResult {
        match self
            .targets
            .inspector
            .missing_columns(CREDENTIAL_TABLE, REQUIRED_CREDENTIAL_COLUMNS)
            .await
        {
            Ok(missing) if missing.is_empty() => CheckResult::pass(
                components::SCHEMA,
                format!("{} has all required columns", CREDENTIAL_TABLE),
            ),
            Ok(missing) => CheckResult::fail(
                components::SCHEMA,
                format!("{} is missing columns: {}", CREDENTIAL_TABLE, missing.join(", ")),
            )
            .with_details(json!({ "table": CREDENTIAL_TABLE, "missing_columns": missing })),
            Err(e) => CheckResult::fail(
                components::SCHEMA,
                format!("schema inspection failed: {}", e.sanitized_message()),
            ),
        }
    }

    /// (d) row-level access policies on the credential table
    async fn check_row_security(&self) -> CheckResult {
        match self.targets.inspector.row_security(CREDENTIAL_TABLE).await {
            Ok(rls) if !rls.enabled => CheckResult::fail(
                components::ROW_SECURITY,
                format!("row level security is disabled on {}", CREDENTIAL_TABLE),
            ),
            Ok(rls) if rls.policies.is_empty() => CheckResult::fail(
                components::ROW_SECURITY,
                format!("no row level security policies defined on {}", CREDENTIAL_TABLE),
            ),
            Ok(rls) => CheckResult::pass(
                components::ROW_SECURITY,
                format!("{} policies active", rls.policies.len()),
            )
            .with_details(json!({ "policies": rls.policies })),
            Err(e) => CheckResult::fail(
                components::ROW_SECURITY,
                format!("policy inspection failed: {}", e.sanitized_message()),
            ),
        }
    }

    /// (e) repositories and the audit trail behind the lifecycle operations respond
    async fn check_lifecycle(&self) -> CheckResult {
        let probes = [
            ("credential_records", self.targets.records.ping().await),
            ("usage_history", self.targets.usage.ping().await),
            ("audit_trail", self.auditor.ping().await),
        ];

        let unreachable: Vec<String> = probes
            .iter()
            .filter_map(|(name, result)| {
                result.as_ref().err().map(|e| format!("{}: {}", name, e.sanitized_message()))
            })
            .collect();

        if unreachable.is_empty() {
            CheckResult::pass(components::LIFECYCLE, "lifecycle dependencies reachable")
        } else {
            CheckResult::fail(
                components::LIFECYCLE,
                format!("lifecycle dependencies unreachable: {}", unreachable.join("; ")),
            )
        }
    }

    /// (f) identity provider reachability
    async fn check_identity(&self) -> CheckResult {
        let provider = self.targets.identity.name();
        match self.targets.identity.health().await {
            Ok(description) => CheckResult::pass(components::IDENTITY, description)
                .with_details(json!({ "provider": provider })),
            Err(e) => CheckResult::fail(components::IDENTITY, sanitize_message(&e.to_string()))
                .with_details(json!({ "provider": provider })),
        }
    }

    /// (g) required configuration present and valid
    fn check_configuration(&self) -> CheckResult {
        let missing = self.config.missing_required_settings();
        if !missing.is_empty() {
            return CheckResult::fail(
                components::CONFIGURATION,
                format!("missing required settings: {}", missing.join(", ")),
            )
            .with_details(json!({ "missing": missing }));
        }

        match self.config.validate() {
            Ok(()) => CheckResult::pass(components::CONFIGURATION, "required settings present"),
            Err(e) => CheckResult::fail(components::CONFIGURATION, e.sanitized_message()),
        }
    }
}

fn recommendation_for(component: &str, status: CheckStatus) -> Option<&'static str> {
    let text = match (component, status) {
        (components::STORE_CAPABILITY, CheckStatus::Warning) => {
            "Configure a durable secret backend (postgres or vault) before storing real credentials"
        }
        (components::STORE_CAPABILITY, _) => {
            "Install and enable the secret store extension, or check the Vault address, token and mount"
        }
        (components::ROUND_TRIP, _) => {
            "Verify the gateway role can create, read and delete secrets in the store"
        }
        (components::SCHEMA, _) => "Run `credgate migrate` to add the missing credential columns",
        (components::ROW_SECURITY, _) => {
            "Enable row level security on provider_credentials and apply the owner policies"
        }
        (components::LIFECYCLE, _) => "Check database connectivity for the lifecycle tables",
        (components::IDENTITY, _) => {
            "Check CREDGATE_IDENTITY_URL and the service key, or the JWT secret in jwt mode"
        }
        (components::CONFIGURATION, _) => "Set the missing environment variables and restart",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditEventStore;
    use crate::config::SecretBackend;
    use crate::identity::JwtIdentityProvider;
    use crate::lifecycle::{InMemorySecretRecordRepository, InMemoryUsageRepository};
    use crate::secrets::{InMemorySecretStore, SecretRef};
    use crate::vault_audit::StaticDeploymentInspector;
    use async_trait::async_trait;

    /// Wraps the in-memory store but reports itself as a durable backend.
    struct DurableStore(InMemorySecretStore);

    #[async_trait]
    impl SecretStore for DurableStore {
        fn backend_name(&self) -> &'static str {
            "postgres"
        }

        async fn create(
            &self,
            name: &str,
            plaintext: &SecretString,
        ) -> crate::secrets::Result<SecretRef> {
            self.0.create(name, plaintext).await
        }

        async fn fetch(&self, reference: &SecretRef) -> crate::secrets::Result<SecretString> {
            self.0.fetch(reference).await
        }

        async fn delete(&self, reference: &SecretRef) -> crate::secrets::Result<()> {
            self.0.delete(reference).await
        }

        async fn probe(&self) -> crate::secrets::Result<String> {
            Ok("supabase_vault extension installed".to_string())
        }
    }

    struct Fixture {
        auditor: VaultHealthAuditor,
        audit: Arc<InMemoryAuditEventStore>,
    }

    fn fixture(store: Arc<dyn SecretStore>, inspector: StaticDeploymentInspector) -> Fixture {
        let audit = Arc::new(InMemoryAuditEventStore::new());
        let security = Arc::new(SecurityAuditor::new(audit.clone(), Default::default()));
        let config = AppConfig::for_tests();
        let targets = HealthTargets {
            store,
            inspector: Arc::new(inspector),
            records: Arc::new(InMemorySecretRecordRepository::new()),
            usage: Arc::new(InMemoryUsageRepository::new()),
            identity: Arc::new(
                JwtIdentityProvider::from_config(&config.identity).expect("jwt provider"),
            ),
        };
        Fixture { auditor: VaultHealthAuditor::new(targets, security, Arc::new(config)), audit }
    }

    fn durable() -> Arc<dyn SecretStore> {
        Arc::new(DurableStore(InMemorySecretStore::new()))
    }

    #[tokio::test]
    async fn test_provisioned_deployment_is_healthy() {
        let f = fixture(durable(), StaticDeploymentInspector::provisioned());
        let report = f.auditor.run("admin-1").await;

        assert_eq!(report.overall_status, OverallStatus::Healthy);
        assert_eq!(report.failed().count(), 0);
        assert_eq!(report.checks.len(), 7);
        assert!(report.recommendations.is_empty());

        let events = f.audit.with_operation(operations::VAULT_HEALTH_CHECK).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata["overall_status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_columns_is_critical() {
        let inspector =
            StaticDeploymentInspector::provisioned().without_columns(&["key_digest", "masked_key"]);
        let f = fixture(durable(), inspector);
        let report = f.auditor.run("admin-1").await;

        assert_eq!(report.overall_status, OverallStatus::Critical);
        let schema = report.check(components::SCHEMA).unwrap();
        assert_eq!(schema.status, CheckStatus::Fail);
        assert!(schema.message.contains("key_digest"));
        assert!(schema.message.contains("masked_key"));
        assert!(!report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_is_degraded() {
        let f = fixture(Arc::new(InMemorySecretStore::new()), StaticDeploymentInspector::provisioned());
        let report = f.auditor.run("admin-1").await;
        assert_eq!(report.overall_status, OverallStatus::Degraded);
        assert_eq!(report.check(components::STORE_CAPABILITY).unwrap().status, CheckStatus::Warning);
    }

    #[tokio::test]
    async fn test_round_trip_cleans_up_probe_secret() {
        let memory = Arc::new(InMemorySecretStore::new());
        let f = fixture(memory.clone(), StaticDeploymentInspector::provisioned());
        f.auditor.run("admin-1").await;
        assert!(memory.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_round_trip_passing() {
        let memory = Arc::new(InMemorySecretStore::new());
        memory.set_fail_deletes(true);
        let f = fixture(memory.clone(), StaticDeploymentInspector::provisioned());

        let report = f.auditor.run("admin-1").await;
        let round_trip = report.check(components::ROUND_TRIP).unwrap();
        assert_eq!(round_trip.status, CheckStatus::Pass);
        assert_eq!(round_trip.details.as_ref().unwrap()["cleanup"], "failed");
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_and_continues() {
        let memory = InMemorySecretStore::new();
        memory.set_unavailable(true);
        let f = fixture(Arc::new(memory), StaticDeploymentInspector::provisioned());

        let report = f.auditor.run("admin-1").await;
        assert_eq!(report.overall_status, OverallStatus::Critical);
        assert_eq!(report.check(components::ROUND_TRIP).unwrap().status, CheckStatus::Fail);
        assert_eq!(report.check(components::SCHEMA).unwrap().status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn test_rls_disabled_fails() {
        let mut inspector = StaticDeploymentInspector::provisioned();
        inspector.row_security.enabled = false;
        let f = fixture(durable(), inspector);
        let report = f.auditor.run("admin-1").await;
        assert_eq!(report.check(components::ROW_SECURITY).unwrap().status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn test_missing_configuration_fails() {
        let audit = Arc::new(InMemoryAuditEventStore::new());
        let security = Arc::new(SecurityAuditor::new(audit, Default::default()));
        let mut config = AppConfig::for_tests();
        config.secret_store.backend = SecretBackend::Vault;
        config.secret_store.vault.token = None;
        let targets = HealthTargets {
            store: durable(),
            inspector: Arc::new(StaticDeploymentInspector::provisioned()),
            records: Arc::new(InMemorySecretRecordRepository::new()),
            usage: Arc::new(InMemoryUsageRepository::new()),
            identity: Arc::new(JwtIdentityProvider::new(b"0123456789abcdef0123456789abcdef")),
        };
        let auditor = VaultHealthAuditor::new(targets, security, Arc::new(config));

        let report = auditor.run("admin-1").await;
        let check = report.check(components::CONFIGURATION).unwrap();
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.message.contains("VAULT_TOKEN"));
    }

    #[tokio::test]
    async fn test_missing_database_url_fails_configuration() {
        let audit = Arc::new(InMemoryAuditEventStore::new());
        let security = Arc::new(SecurityAuditor::new(audit, Default::default()));
        let mut config = AppConfig::for_tests();
        config.database.url = String::new();
        let targets = HealthTargets {
            store: durable(),
            inspector: Arc::new(StaticDeploymentInspector::provisioned()),
            records: Arc::new(InMemorySecretRecordRepository::new()),
            usage: Arc::new(InMemoryUsageRepository::new()),
            identity: Arc::new(JwtIdentityProvider::new(b"0123456789abcdef0123456789abcdef")),
        };
        let auditor = VaultHealthAuditor::new(targets, security, Arc::new(config));

        let report = auditor.run("admin-1").await;
        assert_eq!(report.overall_status, OverallStatus::Critical);
        let check = report.check(components::CONFIGURATION).unwrap();
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.message.contains("DATABASE_URL"));
        assert_eq!(check.details.as_ref().unwrap()["missing"][0], "DATABASE_URL");
    }

    #[tokio::test]
    async fn test_non_admin_is_denied_and_audited() {
        let f = fixture(durable(), StaticDeploymentInspector::provisioned());
        let err = f.auditor.run_as(&IdentityContext::user("user-1")).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthorizationFailed(_)));

        let events = f.audit.with_operation(operations::VAULT_HEALTH_CHECK).await;
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert_eq!(events[0].risk_level, RiskLevel::High);

        assert!(f.auditor.run_as(&IdentityContext::admin("admin-1")).await.is_ok());
    }
}
