//! Usage history repository backed by `credential_usage`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::Result;
use crate::lifecycle::{UsageRecord, UsageRepository};
use crate::storage::DbPool;

#[derive(Debug, Clone, FromRow)]
struct UsageRow {
    id: Uuid,
    secret_id: Uuid,
    user_id: String,
    occurred_at: DateTime<Utc>,
    success: bool,
    cost: f64,
    request_type: Option<String>,
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        Self {
            id: row.id,
            secret_id: row.secret_id,
            user_id: row.user_id,
            occurred_at: row.occurred_at,
            success: row.success,
            cost: row.cost,
            request_type: row.request_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgUsageRepository {
    pool: DbPool,
}

impl PgUsageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
    async fn record(&self, usage: &UsageRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO credential_usage (id, secret_id, user_id, occurred_at, success, cost, request_type) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(usage.id)
        .bind(usage.secret_id)
        .bind(&usage.user_id)
        .bind(usage.occurred_at)
        .bind(usage.success)
        .bind(usage.cost)
        .bind(&usage.request_type)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE provider_credentials SET last_used_at = GREATEST(COALESCE(last_used_at, $2), $2) WHERE id = $1",
        )
        .bind(usage.secret_id)
        .bind(usage.occurred_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn between(
        &self,
        secret_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        let rows = sqlx::query_as::<_, UsageRow>(
            "SELECT id, secret_id, user_id, occurred_at, success, cost, request_type FROM credential_usage \
             WHERE secret_id = $1 AND occurred_at >= $2 AND occurred_at <= $3 \
             ORDER BY occurred_at DESC",
        )
        .bind(secret_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UsageRecord::from).collect())
    }

    async fn ping(&self) -> Result<()> {
        crate::storage::check_connection(&self.pool).await
    }
}

#[cfg(all(test, feature = "postgres_tests"))]
mod tests {
    use super::*;
    use crate::lifecycle::{SecretRecord, SecretRecordRepository};
    use crate::secrets::SecretRef;
    use crate::storage::pg::PgSecretRecordRepository;
    use crate::storage::test_helpers::TestDatabase;

    #[tokio::test]
    async fn test_record_and_query_range() {
        let db = TestDatabase::new("usage_range").await;
        let records = PgSecretRecordRepository::new(db.pool.clone());
        let usage = PgUsageRepository::new(db.pool.clone());

        let record = SecretRecord::new(
            "user-1",
            "openai",
            SecretRef::new("ref"),
            "****".into(),
            "sk-".into(),
            "ab".into(),
        );
        records.insert(&record).await.unwrap();

        let now = Utc::now();
        for hours in [1, 2, 48] {
            let entry = UsageRecord::new(record.id, "user-1", hours != 2, 0.5)
                .at(now - chrono::Duration::hours(hours));
            usage.record(&entry).await.unwrap();
        }

        let found = usage.between(record.id, now - chrono::Duration::hours(24), now).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].occurred_at > found[1].occurred_at);

        let reloaded = records.get(record.id).await.unwrap().unwrap();
        assert!(reloaded.last_used_at.is_some());
    }
}
