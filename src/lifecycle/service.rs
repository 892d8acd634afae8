//! Key lifecycle business logic.
//!
//! Composes the identity context, secret store, key validator and security
//! auditor into the store / rotate / revoke / validate / usage / audit-log
//! operations. Every operation is audited exactly once with its outcome,
//! whether it succeeded or failed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::model::{KeyStatus, SecretRecord, UsageRecord};
use super::repository::{SecretRecordRepository, UsageRepository};
use crate::audit::{operations, RiskLevel, SecurityAuditEvent, SecurityAuditor, SYSTEM_PROVIDER};
use crate::config::SecurityPolicy;
use crate::errors::{GatewayError, Result};
use crate::identity::IdentityContext;
use crate::observability::MetricsRecorder;
use crate::secrets::{SecretRef, SecretStore, SecretString};
use crate::validation::{
    key_digest, key_prefix, mask_key, validate_provider_id, KeyValidator, SecurityReport,
};

/// Default length of a usage report range when no start date is given.
pub const DEFAULT_USAGE_RANGE_DAYS: i64 = 30;
/// Maximum number of usage entries returned in a report.
pub const MAX_USAGE_DETAILS: usize = 100;
pub const DEFAULT_AUDIT_PAGE_SIZE: i64 = 50;
pub const MAX_AUDIT_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredKey {
    pub secret_id: Uuid,
    pub masked_key: String,
    pub created_at: DateTime<Utc>,
    pub security: SecurityReport,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RotatedKey {
    pub secret_id: Uuid,
    pub masked_key: String,
    pub rotated_at: DateTime<Utc>,
    pub security: SecurityReport,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokedKey {
    pub secret_id: Uuid,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub provider: String,
    pub status: KeyStatus,
    pub is_active: bool,
    pub masked_key: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
}

impl From<&SecretRecord> for KeyInfo {
    fn from(record: &SecretRecord) -> Self {
        Self {
            provider: record.provider.clone(),
            status: record.status,
            is_active: record.is_active(),
            masked_key: record.masked_key.clone(),
            created_at: record.created_at,
            last_used: record.last_used_at,
            last_validated: record.last_validated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyValidation {
    /// Same as `security.isSecure`
    pub valid: bool,
    pub key_info: KeyInfo,
    pub security: SecurityReport,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub secret_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_cost: f64,
    /// Newest first, at most 100 entries
    pub details: Vec<UsageRecord>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogPage {
    pub entries: Vec<SecurityAuditEvent>,
    pub pagination: Pagination,
}

/// Clamp caller-supplied paging parameters.
pub fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_AUDIT_PAGE_SIZE).clamp(1, MAX_AUDIT_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Resolve an optional usage range; `end` defaults to `now`, `start` to 30 days before `end`.
pub fn usage_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let end = end.unwrap_or(now);
    let start = start.unwrap_or(end - Duration::days(DEFAULT_USAGE_RANGE_DAYS));
    if start > end {
        return Err(GatewayError::validation("startDate must not be after endDate"));
    }
    Ok((start, end))
}

/// Store-side name for a new plaintext. Unique per call so a rotation never
/// overwrites the value it supersedes.
fn secret_name(record_id: Uuid, provider: &str) -> String {
    format!("provider_key_{}_{}_{}", record_id.simple(), provider, Uuid::new_v4().simple())
}

fn outcome_risk(error: &GatewayError) -> RiskLevel {
    match error {
        GatewayError::AuthorizationFailed(_) | GatewayError::AuthenticationFailed(_) => {
            RiskLevel::High
        }
        _ => RiskLevel::Medium,
    }
}

/// Orchestrates credential lifecycle operations for one deployment.
pub struct KeyLifecycleService {
    records: Arc<dyn SecretRecordRepository>,
    usage: Arc<dyn UsageRepository>,
    store: Arc<dyn SecretStore>,
    validator: KeyValidator,
    auditor: Arc<SecurityAuditor>,
    policy: SecurityPolicy,
    metrics: MetricsRecorder,
}

impl KeyLifecycleService {
    pub fn new(
        records: Arc<dyn SecretRecordRepository>,
        usage: Arc<dyn UsageRepository>,
        store: Arc<dyn SecretStore>,
        auditor: Arc<SecurityAuditor>,
        policy: SecurityPolicy,
    ) -> Self {
        Self {
            validator: KeyValidator::new(policy.clone(), auditor.clone()),
            records,
            usage,
            store,
            auditor,
            policy,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn auditor(&self) -> &Arc<SecurityAuditor> {
        &self.auditor
    }

    pub fn validator(&self) -> &KeyValidator {
        &self.validator
    }

    /// Store the caller's first credential for `provider`.
    #[instrument(skip(self, identity, plaintext), fields(user_id = identity.actor()))]
    pub async fn store_key(
        &self,
        identity: &IdentityContext,
        provider: &str,
        plaintext: SecretString,
    ) -> Result<StoredKey> {
        let result = self.store_key_inner(identity, provider, &plaintext).await;
        let secret_id = result.as_ref().ok().map(|stored| stored.secret_id);
        self.audit_outcome(operations::STORE, provider, identity, secret_id, &result).await;
        result
    }

    async fn store_key_inner(
        &self,
        identity: &IdentityContext,
        provider: &str,
        plaintext: &SecretString,
    ) -> Result<StoredKey> {
        let owner = identity.require_user()?;
        self.require_mfa(identity)?;
        validate_provider_id(provider)?;
        if plaintext.is_empty() {
            return Err(GatewayError::validation("key cannot be empty"));
        }

        if self.records.find_by_owner_and_provider(owner, provider).await?.is_some() {
            return Err(GatewayError::validation(format!(
                "a {} key already exists for this user; rotate it instead",
                provider
            )));
        }

        let security = self.validator.validate_security(owner, provider, plaintext, None).await;
        if self.policy.block_insecure_rotation && !security.is_secure {
            return Err(GatewayError::validation(format!(
                "key failed security checks: {}",
                security.warning_kinds().join(", ")
            )));
        }

        let mut record = SecretRecord::new(
            owner,
            provider,
            SecretRef::new(""),
            mask_key(plaintext),
            key_prefix(provider, plaintext),
            key_digest(plaintext),
        );
        record.secret_ref = self.store.create(&secret_name(record.id, provider), plaintext).await?;
        record.last_validated_at = Some(record.created_at);

        if let Err(e) = self.records.insert(&record).await {
            self.discard_secret(&record.secret_ref, "store").await;
            return Err(e);
        }

        info!(secret_id = %record.id, provider = %provider, "Provider key stored");
        Ok(StoredKey {
            secret_id: record.id,
            masked_key: record.masked_key,
            created_at: record.created_at,
            security,
        })
    }

    /// Replace the plaintext behind `secret_id` with `new_plaintext`.
    #[instrument(skip(self, identity, new_plaintext), fields(user_id = identity.actor(), secret_id = %secret_id))]
    pub async fn rotate(
        &self,
        identity: &IdentityContext,
        secret_id: Uuid,
        provider: &str,
        new_plaintext: SecretString,
    ) -> Result<RotatedKey> {
        let result = self.rotate_inner(identity, secret_id, provider, &new_plaintext).await;
        self.audit_outcome(operations::ROTATE, provider, identity, Some(secret_id), &result).await;
        result
    }

    async fn rotate_inner(
        &self,
        identity: &IdentityContext,
        secret_id: Uuid,
        provider: &str,
        new_plaintext: &SecretString,
    ) -> Result<RotatedKey> {
        let actor = identity.require_user()?;
        self.require_mfa(identity)?;
        let mut record = self.load_owned(identity, secret_id).await?;

        if record.is_revoked() {
            return Err(GatewayError::validation("revoked keys cannot be rotated"));
        }
        if record.provider != provider {
            return Err(GatewayError::validation(format!(
                "key belongs to provider '{}', not '{}'",
                record.provider, provider
            )));
        }
        if new_plaintext.is_empty() {
            return Err(GatewayError::validation("key cannot be empty"));
        }

        let digest = key_digest(new_plaintext);
        if digest == record.key_digest {
            return Err(GatewayError::validation("new key is identical to the current key"));
        }

        let security = self.validator.validate_security(actor, provider, new_plaintext, None).await;
        if self.policy.block_insecure_rotation && !security.is_secure {
            return Err(GatewayError::validation(format!(
                "new key failed security checks: {}",
                security.warning_kinds().join(", ")
            )));
        }

        let new_ref = self.store.create(&secret_name(record.id, provider), new_plaintext).await?;
        let old_ref = std::mem::replace(&mut record.secret_ref, new_ref.clone());

        let now = Utc::now();
        record.masked_key = mask_key(new_plaintext);
        record.key_prefix = key_prefix(provider, new_plaintext);
        record.key_digest = digest;
        record.status = KeyStatus::Active;
        record.rotated_at = Some(now);
        record.last_validated_at = Some(now);

        if let Err(e) = self.records.update(&record).await {
            self.discard_secret(&new_ref, "rotate").await;
            return Err(GatewayError::store_unavailable(format!(
                "failed to persist rotated key: {}",
                e.sanitized_message()
            )));
        }

        // The record already points at the new reference.
        if let Err(e) = self.store.delete(&old_ref).await {
            warn!(
                secret_id = %record.id,
                error = %crate::errors::sanitize_message(&e.to_string()),
                "Superseded secret could not be deleted"
            );
        }

        info!(secret_id = %record.id, provider = %provider, "Provider key rotated");
        Ok(RotatedKey { secret_id: record.id, masked_key: record.masked_key, rotated_at: now, security })
    }

    /// Soft-delete: mark the record revoked and keep it for audit continuity.
    #[instrument(skip(self, identity, reason), fields(user_id = identity.actor(), secret_id = %secret_id))]
    pub async fn revoke(
        &self,
        identity: &IdentityContext,
        secret_id: Uuid,
        reason: Option<String>,
    ) -> Result<RevokedKey> {
        let (provider, result) = self.revoke_inner(identity, secret_id, reason).await;
        self.audit_outcome(operations::REVOKE, &provider, identity, Some(secret_id), &result)
            .await;
        result
    }

    async fn revoke_inner(
        &self,
        identity: &IdentityContext,
        secret_id: Uuid,
        reason: Option<String>,
    ) -> (String, Result<RevokedKey>) {
        let mut record = match self.authorized_record(identity, secret_id, true).await {
            Ok(record) => record,
            Err(e) => return (SYSTEM_PROVIDER.to_string(), Err(e)),
        };
        let provider = record.provider.clone();

        if let (true, Some(revoked_at)) = (record.is_revoked(), record.revoked_at) {
            return (provider, Ok(RevokedKey { secret_id, revoked_at }));
        }

        let now = Utc::now();
        record.status = KeyStatus::Revoked;
        record.revoked_at = Some(now);
        record.revocation_reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .or_else(|| Some("revoked by owner".to_string()));

        if let Err(e) = self.records.update(&record).await {
            return (provider, Err(e));
        }

        info!(secret_id = %secret_id, provider = %provider, "Provider key revoked");
        (provider, Ok(RevokedKey { secret_id, revoked_at: now }))
    }

    /// Re-check the stored plaintext and refresh the record's validation state.
    #[instrument(skip(self, identity), fields(user_id = identity.actor(), secret_id = %secret_id))]
    pub async fn validate(&self, identity: &IdentityContext, secret_id: Uuid) -> Result<KeyValidation> {
        let (provider, result) = self.validate_inner(identity, secret_id).await;
        self.audit_outcome(operations::VALIDATE, &provider, identity, Some(secret_id), &result)
            .await;
        result
    }

    async fn validate_inner(
        &self,
        identity: &IdentityContext,
        secret_id: Uuid,
    ) -> (String, Result<KeyValidation>) {
        let mut record = match self.authorized_record(identity, secret_id, false).await {
            Ok(record) => record,
            Err(e) => return (SYSTEM_PROVIDER.to_string(), Err(e)),
        };
        let provider = record.provider.clone();

        if record.is_revoked() {
            return (provider, Err(GatewayError::validation("revoked keys cannot be validated")));
        }

        let security = {
            let plaintext = match self.store.fetch(&record.secret_ref).await {
                Ok(plaintext) => plaintext,
                Err(e) => return (provider, Err(e.into())),
            };
            self.validator
                .validate_security(identity.actor(), &provider, &plaintext, Some(&record))
                .await
        };

        record.last_validated_at = Some(Utc::now());
        record.status =
            if security.has_format_problem() { KeyStatus::Error } else { KeyStatus::Active };

        if let Err(e) = self.records.update(&record).await {
            return (provider, Err(e));
        }

        let validation =
            KeyValidation { valid: security.is_secure, key_info: KeyInfo::from(&record), security };
        (provider, Ok(validation))
    }

    /// Aggregate usage for `secret_id` over `[start, end]`. Read-only.
    #[instrument(skip(self, identity), fields(user_id = identity.actor(), secret_id = %secret_id))]
    pub async fn usage_report(
        &self,
        identity: &IdentityContext,
        secret_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<UsageReport> {
        let (provider, result) = self.usage_report_inner(identity, secret_id, start, end).await;
        self.audit_outcome(operations::USAGE_REPORT, &provider, identity, Some(secret_id), &result)
            .await;
        result
    }

    async fn usage_report_inner(
        &self,
        identity: &IdentityContext,
        secret_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> (String, Result<UsageReport>) {
        let record = match self.authorized_record_or_admin(identity, secret_id).await {
            Ok(record) => record,
            Err(e) => return (SYSTEM_PROVIDER.to_string(), Err(e)),
        };
        let provider = record.provider.clone();

        let report = self.aggregate_usage(secret_id, start, end).await;
        (provider, report)
    }

    async fn aggregate_usage(
        &self,
        secret_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<UsageReport> {
        let (start, end) = usage_range(start, end, Utc::now())?;
        let usage = self.usage.between(secret_id, start, end).await?;

        let total_requests = usage.len() as u64;
        let successful_requests = usage.iter().filter(|u| u.success).count() as u64;
        let total_cost = usage.iter().map(|u| u.cost).sum();
        let details = usage.into_iter().take(MAX_USAGE_DETAILS).collect();

        Ok(UsageReport {
            secret_id,
            start_date: start,
            end_date: end,
            total_requests,
            successful_requests,
            failed_requests: total_requests - successful_requests,
            total_cost,
            details,
        })
    }

    /// A page of the security audit trail. Admin only.
    #[instrument(skip(self, identity), fields(user_id = identity.actor()))]
    pub async fn audit_log(
        &self,
        identity: &IdentityContext,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<AuditLogPage> {
        let result = self.audit_log_page(identity, limit, offset).await;
        self.audit_outcome(operations::AUDIT_LOG_READ, SYSTEM_PROVIDER, identity, None, &result)
            .await;
        result
    }

    async fn audit_log_page(
        &self,
        identity: &IdentityContext,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<AuditLogPage> {
        self.require_admin(identity)?;
        let (limit, offset) = clamp_page(limit, offset);
        let (entries, total) = self.auditor.page(limit, offset).await?;
        let has_more = offset + (entries.len() as i64) < total;
        Ok(AuditLogPage { entries, pagination: Pagination { total, limit, offset, has_more } })
    }

    /// Fails with `AuthorizationFailed` unless the caller is an authenticated admin.
    pub fn require_admin(&self, identity: &IdentityContext) -> Result<()> {
        identity.require_user()?;
        if identity.is_admin {
            Ok(())
        } else {
            Err(GatewayError::authorization("administrator privileges required"))
        }
    }

    fn require_mfa(&self, identity: &IdentityContext) -> Result<()> {
        if self.policy.require_mfa && !identity.mfa_verified {
            return Err(GatewayError::authorization("multi-factor authentication required"));
        }
        Ok(())
    }

    async fn load(&self, secret_id: Uuid) -> Result<SecretRecord> {
        self.records
            .get(secret_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("secret {} not found", secret_id)))
    }

    /// The record, provided the caller owns it.
    async fn load_owned(&self, identity: &IdentityContext, secret_id: Uuid) -> Result<SecretRecord> {
        let user = identity.require_user()?;
        let record = self.load(secret_id).await?;
        if record.owner_id != user {
            warn!(secret_id = %secret_id, user_id = %user, "Ownership check failed");
            return Err(GatewayError::authorization("caller does not own this key"));
        }
        Ok(record)
    }

    async fn authorized_record(
        &self,
        identity: &IdentityContext,
        secret_id: Uuid,
        needs_mfa: bool,
    ) -> Result<SecretRecord> {
        identity.require_user()?;
        if needs_mfa {
            self.require_mfa(identity)?;
        }
        self.load_owned(identity, secret_id).await
    }

    async fn authorized_record_or_admin(
        &self,
        identity: &IdentityContext,
        secret_id: Uuid,
    ) -> Result<SecretRecord> {
        identity.require_user()?;
        if identity.is_admin {
            return self.load(secret_id).await;
        }
        self.load_owned(identity, secret_id).await
    }

    /// Remove a secret written during an operation that then failed.
    async fn discard_secret(&self, reference: &SecretRef, operation: &str) {
        if let Err(e) = self.store.delete(reference).await {
            warn!(
                operation = %operation,
                error = %crate::errors::sanitize_message(&e.to_string()),
                "Failed to discard secret after aborted operation"
            );
        }
    }

    async fn audit_outcome<T>(
        &self,
        operation: &'static str,
        provider: &str,
        identity: &IdentityContext,
        secret_id: Option<Uuid>,
        result: &Result<T>,
    ) {
        let mut event = SecurityAuditEvent::new(operation, provider, identity.actor());
        if let Some(secret_id) = secret_id {
            event = event.with_metadata("secret_id", secret_id.to_string());
        }

        let outcome = match result {
            Ok(_) => "success",
            Err(e) => {
                event = event.with_error(e).risk(outcome_risk(e));
                e.code()
            }
        };

        self.metrics.record_operation(operation, outcome);
        self.auditor.record(event).await;
    }
}
