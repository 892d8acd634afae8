//! Shared handler state and backend wiring.

use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditEventStore, InMemoryAuditEventStore, SecurityAuditor};
use crate::config::{AppConfig, SecretBackend};
use crate::errors::{GatewayError, Result};
use crate::identity::IdentityResolver;
use crate::lifecycle::{
    InMemorySecretRecordRepository, InMemoryUsageRepository, KeyLifecycleService,
    SecretRecordRepository, UsageRepository,
};
use crate::ratelimit::{InMemoryRateLimitStore, RateLimiter};
use crate::secrets::{InMemorySecretStore, PgVaultSecretStore, SecretStore, VaultSecretStore};
use crate::storage::{
    create_pool, PgAuditEventStore, PgSecretRecordRepository, PgUsageRepository,
};
use crate::vault_audit::{
    DeploymentInspector, HealthTargets, PgDeploymentInspector, StaticDeploymentInspector,
    VaultHealthAuditor,
};

/// Concrete backends behind every trait seam.
pub struct Backends {
    pub store: Arc<dyn SecretStore>,
    pub records: Arc<dyn SecretRecordRepository>,
    pub usage: Arc<dyn UsageRepository>,
    pub audit: Arc<dyn AuditEventStore>,
    pub inspector: Arc<dyn DeploymentInspector>,
}

impl Backends {
    /// Process-local backends for development and tests.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemorySecretStore::new()),
            records: Arc::new(InMemorySecretRecordRepository::new()),
            usage: Arc::new(InMemoryUsageRepository::new()),
            audit: Arc::new(InMemoryAuditEventStore::new()),
            inspector: Arc::new(StaticDeploymentInspector::provisioned()),
        }
    }

    /// Backends selected by `config.secret_store.backend`.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        if config.secret_store.backend == SecretBackend::Memory {
            return Ok(Self::in_memory());
        }

        let pool = create_pool(&config.database).await?;
        let store: Arc<dyn SecretStore> = match config.secret_store.backend {
            SecretBackend::Vault => {
                Arc::new(VaultSecretStore::new(config.secret_store.vault.clone()).await?)
            }
            _ => Arc::new(PgVaultSecretStore::new(pool.clone(), config.secret_store.timeout())),
        };

        Ok(Self {
            store,
            records: Arc::new(PgSecretRecordRepository::new(pool.clone())),
            usage: Arc::new(PgUsageRepository::new(pool.clone())),
            audit: Arc::new(PgAuditEventStore::new(pool.clone())),
            inspector: Arc::new(PgDeploymentInspector::new(pool)),
        })
    }
}

/// State shared by every handler and middleware.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<AppConfig>,
    pub identity: IdentityResolver,
    pub rate_limiter: RateLimiter,
    pub auditor: Arc<SecurityAuditor>,
    pub lifecycle: Arc<KeyLifecycleService>,
    pub vault_auditor: Arc<VaultHealthAuditor>,
}

impl ApiState {
    /// Build the full state for `config`, connecting to the configured backends.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let backends = Backends::from_config(&config).await?;
        Self::with_backends(config, backends)
    }

    pub fn with_backends(config: AppConfig, backends: Backends) -> Result<Self> {
        let identity = IdentityResolver::from_config(&config.identity).map_err(GatewayError::from)?;
        let rate_limiter =
            RateLimiter::from_config(&config.rate_limit, Arc::new(InMemoryRateLimitStore::new()));
        let auditor = Arc::new(SecurityAuditor::new(backends.audit, config.security.clone()));

        let lifecycle = Arc::new(KeyLifecycleService::new(
            backends.records.clone(),
            backends.usage.clone(),
            backends.store.clone(),
            auditor.clone(),
            config.security.clone(),
        ));

        let config = Arc::new(config);
        let vault_auditor = Arc::new(VaultHealthAuditor::new(
            HealthTargets {
                store: backends.store.clone(),
                inspector: backends.inspector,
                records: backends.records,
                usage: backends.usage,
                identity: identity.provider().clone(),
            },
            auditor.clone(),
            config.clone(),
        ));

        info!(
            secret_backend = backends.store.backend_name(),
            identity_provider = identity.provider().name(),
            "Gateway state assembled"
        );

        Ok(Self { config, identity, rate_limiter, auditor, lifecycle, vault_auditor })
    }
}
