//! Security audit trail backed by the append-only `security_audit_log` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::Instrument;
use uuid::Uuid;

use crate::audit::{AuditEventStore, SecurityAuditEvent};
use crate::errors::{GatewayError, Result};
use crate::storage::DbPool;

#[derive(Debug, Clone, FromRow)]
struct AuditRow {
    id: Uuid,
    operation: String,
    provider: String,
    user_id: String,
    occurred_at: DateTime<Utc>,
    success: bool,
    risk_level: String,
    metadata: Json<serde_json::Map<String, serde_json::Value>>,
}

impl TryFrom<AuditRow> for SecurityAuditEvent {
    type Error = GatewayError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            operation: row.operation,
            provider: row.provider,
            user_id: row.user_id,
            timestamp: row.occurred_at,
            success: row.success,
            risk_level: row.risk_level.parse()?,
            metadata: row.metadata.0,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, operation, provider, user_id, occurred_at, success, risk_level, metadata";

#[derive(Debug, Clone)]
pub struct PgAuditEventStore {
    pool: DbPool,
}

impl PgAuditEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditEventStore for PgAuditEventStore {
    async fn append(&self, event: &SecurityAuditEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO security_audit_log (id, operation, provider, user_id, occurred_at, success, risk_level, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (id) DO NOTHING",
        )
        .bind(event.id)
        .bind(&event.operation)
        .bind(&event.provider)
        .bind(&event.user_id)
        .bind(event.timestamp)
        .bind(event.success)
        .bind(event.risk_level.as_str())
        .bind(Json(&event.metadata))
        .execute(&self.pool)
        .instrument(crate::db_span!("append_audit_event", operation_name = %event.operation))
        .await?;
        Ok(())
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SecurityAuditEvent>> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {} FROM security_audit_log WHERE user_id = $1 AND occurred_at >= $2 ORDER BY occurred_at ASC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SecurityAuditEvent::try_from).collect()
    }

    async fn query(&self, limit: i64, offset: i64) -> Result<Vec<SecurityAuditEvent>> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {} FROM security_audit_log ORDER BY occurred_at DESC LIMIT $1 OFFSET $2",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .instrument(crate::db_span!("query_audit_log", limit = limit, offset = offset))
        .await?;

        rows.into_iter().map(SecurityAuditEvent::try_from).collect()
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM security_audit_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        crate::storage::check_connection(&self.pool).await
    }
}

#[cfg(all(test, feature = "postgres_tests"))]
mod tests {
    use super::*;
    use crate::audit::{operations, RiskLevel};
    use crate::storage::test_helpers::TestDatabase;

    #[tokio::test]
    async fn test_append_query_and_count() {
        let db = TestDatabase::new("audit_log").await;
        let store = PgAuditEventStore::new(db.pool.clone());

        let first = SecurityAuditEvent::new(operations::ROTATE, "openai", "user-1")
            .at(Utc::now() - chrono::Duration::minutes(1))
            .with_metadata("secret_id", "abc");
        let second = SecurityAuditEvent::new(operations::REVOKE, "openai", "user-1")
            .success(false)
            .risk(RiskLevel::High);
        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let page = store.query(1, 0).await.unwrap();
        assert_eq!(page[0].id, second.id);
        assert_eq!(page[0].risk_level, RiskLevel::High);

        let recent = store
            .recent_for_user("user-1", Utc::now() - chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].metadata["secret_id"], "abc");
    }

    #[tokio::test]
    async fn test_rows_cannot_be_deleted() {
        let db = TestDatabase::new("audit_immutable").await;
        let store = PgAuditEventStore::new(db.pool.clone());
        store.append(&SecurityAuditEvent::new(operations::ROTATE, "openai", "user-1")).await.unwrap();

        let result = sqlx::query("DELETE FROM security_audit_log").execute(&db.pool).await;
        assert!(result.is_err());
    }
}
