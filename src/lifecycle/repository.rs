//! Persistence seams for credential records and usage history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{SecretRecord, UsageRecord};
use crate::errors::{GatewayError, Result};

/// Storage for [`SecretRecord`]s. There is no delete: revocation is a status.
#[async_trait]
pub trait SecretRecordRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<SecretRecord>>;

    async fn find_by_owner_and_provider(
        &self,
        owner_id: &str,
        provider: &str,
    ) -> Result<Option<SecretRecord>>;

    /// Fails with `ValidationFailed` when the owner already has a record for the provider.
    async fn insert(&self, record: &SecretRecord) -> Result<()>;

    /// Overwrite every mutable column. Last writer wins.
    async fn update(&self, record: &SecretRecord) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

/// Read access to per-credential usage history.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn record(&self, usage: &UsageRecord) -> Result<()>;

    /// Usage of `secret_id` within `[start, end]`, newest first.
    async fn between(
        &self,
        secret_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>>;

    async fn ping(&self) -> Result<()>;
}

/// In-process record store for development mode and tests.
#[derive(Default)]
pub struct InMemorySecretRecordRepository {
    records: RwLock<HashMap<Uuid, SecretRecord>>,
    fail_updates: AtomicBool,
}

impl InMemorySecretRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `update` fail with `StoreUnavailable`.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SecretRecordRepository for InMemorySecretRecordRepository {
    async fn get(&self, id: Uuid) -> Result<Option<SecretRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_owner_and_provider(
        &self,
        owner_id: &str,
        provider: &str,
    ) -> Result<Option<SecretRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.owner_id == owner_id && r.provider == provider)
            .cloned())
    }

    async fn insert(&self, record: &SecretRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.values().any(|r| r.owner_id == record.owner_id && r.provider == record.provider)
        {
            return Err(GatewayError::validation(format!(
                "a {} credential already exists for this user",
                record.provider
            )));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &SecretRecord) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(GatewayError::store_unavailable("credential table unavailable"));
        }
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(GatewayError::not_found(format!("secret {} not found", record.id))),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process usage history for development mode and tests.
#[derive(Default)]
pub struct InMemoryUsageRepository {
    usage: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn record(&self, usage: &UsageRecord) -> Result<()> {
        self.usage.write().await.push(usage.clone());
        Ok(())
    }

    async fn between(
        &self,
        secret_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        let mut matching: Vec<_> = self
            .usage
            .read()
            .await
            .iter()
            .filter(|u| u.secret_id == secret_id && u.occurred_at >= start && u.occurred_at <= end)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(matching)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
