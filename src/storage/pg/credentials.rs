//! Credential record repository backed by `provider_credentials`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::{GatewayError, Result};
use crate::lifecycle::{SecretRecord, SecretRecordRepository};
use crate::secrets::SecretRef;
use crate::storage::DbPool;

const SELECT_COLUMNS: &str = "id, owner_id, provider, secret_ref, masked_key, key_prefix, key_digest, status, \
     created_at, last_validated_at, last_used_at, rotated_at, revoked_at, revocation_reason";

/// Database row structure for credential records
#[derive(Debug, Clone, FromRow)]
struct CredentialRow {
    id: Uuid,
    owner_id: String,
    provider: String,
    secret_ref: String,
    masked_key: String,
    key_prefix: String,
    key_digest: String,
    status: String,
    created_at: DateTime<Utc>,
    last_validated_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    rotated_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    revocation_reason: Option<String>,
}

impl TryFrom<CredentialRow> for SecretRecord {
    type Error = GatewayError;

    fn try_from(row: CredentialRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            provider: row.provider,
            secret_ref: SecretRef::new(row.secret_ref),
            masked_key: row.masked_key,
            key_prefix: row.key_prefix,
            key_digest: row.key_digest,
            status: row.status.parse()?,
            created_at: row.created_at,
            last_validated_at: row.last_validated_at,
            last_used_at: row.last_used_at,
            rotated_at: row.rotated_at,
            revoked_at: row.revoked_at,
            revocation_reason: row.revocation_reason,
        })
    }
}

/// Repository for credential records
#[derive(Debug, Clone)]
pub struct PgSecretRecordRepository {
    pool: DbPool,
}

impl PgSecretRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecretRecordRepository for PgSecretRecordRepository {
    #[instrument(skip(self), name = "db_get_credential")]
    async fn get(&self, id: Uuid) -> Result<Option<SecretRecord>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM provider_credentials WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SecretRecord::try_from).transpose()
    }

    #[instrument(skip(self), name = "db_find_credential")]
    async fn find_by_owner_and_provider(
        &self,
        owner_id: &str,
        provider: &str,
    ) -> Result<Option<SecretRecord>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM provider_credentials WHERE owner_id = $1 AND provider = $2",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SecretRecord::try_from).transpose()
    }

    #[instrument(skip(self, record), fields(secret_id = %record.id), name = "db_insert_credential")]
    async fn insert(&self, record: &SecretRecord) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO provider_credentials (id, owner_id, provider, secret_ref, masked_key, key_prefix, key_digest, status, \
             created_at, last_validated_at, last_used_at, rotated_at, revoked_at, revocation_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(&record.provider)
        .bind(record.secret_ref.as_str())
        .bind(&record.masked_key)
        .bind(&record.key_prefix)
        .bind(&record.key_digest)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.last_validated_at)
        .bind(record.last_used_at)
        .bind(record.rotated_at)
        .bind(record.revoked_at)
        .bind(&record.revocation_reason)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(GatewayError::validation(format!(
                    "a {} credential already exists for this user",
                    record.provider
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, record), fields(secret_id = %record.id), name = "db_update_credential")]
    async fn update(&self, record: &SecretRecord) -> Result<()> {
        let result = sqlx::query(
            "UPDATE provider_credentials SET secret_ref = $2, masked_key = $3, key_prefix = $4, key_digest = $5, \
             status = $6, last_validated_at = $7, last_used_at = $8, rotated_at = $9, revoked_at = $10, \
             revocation_reason = $11 WHERE id = $1",
        )
        .bind(record.id)
        .bind(record.secret_ref.as_str())
        .bind(&record.masked_key)
        .bind(&record.key_prefix)
        .bind(&record.key_digest)
        .bind(record.status.as_str())
        .bind(record.last_validated_at)
        .bind(record.last_used_at)
        .bind(record.rotated_at)
        .bind(record.revoked_at)
        .bind(&record.revocation_reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::not_found(format!("secret {} not found", record.id)));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        crate::storage::check_connection(&self.pool).await
    }
}

#[cfg(all(test, feature = "postgres_tests"))]
mod tests {
    use super::*;
    use crate::lifecycle::KeyStatus;
    use crate::storage::test_helpers::TestDatabase;

    fn record(owner: &str) -> SecretRecord {
        SecretRecord::new(
            owner,
            "openai",
            SecretRef::new("8a7c2f0e-1d3b-4c5a-9e6f-7b8c9d0e1f2a"),
            "sk-p****1f2a".into(),
            "sk-".into(),
            "0f".repeat(32),
        )
    }

    #[tokio::test]
    async fn test_insert_get_update() {
        let db = TestDatabase::new("credentials_roundtrip").await;
        let repo = PgSecretRecordRepository::new(db.pool.clone());

        let mut record = record("user-1");
        repo.insert(&record).await.unwrap();

        let loaded = repo.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.owner_id, "user-1");
        assert_eq!(loaded.status, KeyStatus::Active);

        record.status = KeyStatus::Revoked;
        record.revoked_at = Some(Utc::now());
        repo.update(&record).await.unwrap();

        let loaded = repo.find_by_owner_and_provider("user-1", "openai").await.unwrap().unwrap();
        assert_eq!(loaded.status, KeyStatus::Revoked);
    }

    #[tokio::test]
    async fn test_duplicate_owner_provider_rejected() {
        let db = TestDatabase::new("credentials_duplicate").await;
        let repo = PgSecretRecordRepository::new(db.pool.clone());

        repo.insert(&record("user-1")).await.unwrap();
        let err = repo.insert(&record("user-1")).await.unwrap_err();
        assert!(matches!(err, GatewayError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let db = TestDatabase::new("credentials_missing").await;
        let repo = PgSecretRecordRepository::new(db.pool.clone());
        let err = repo.update(&record("user-1")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }
}
