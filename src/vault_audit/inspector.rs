//! Schema and policy introspection for the credential table.

use async_trait::async_trait;

use crate::errors::Result;
use crate::storage::DbPool;

/// Row-level security state of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSecurity {
    pub enabled: bool,
    pub policies: Vec<String>,
}

/// Read-only view of how the deployment's database is provisioned.
#[async_trait]
pub trait DeploymentInspector: Send + Sync {
    /// Columns from `required` that `table` lacks. A missing table lacks all of them.
    async fn missing_columns(&self, table: &str, required: &[&str]) -> Result<Vec<String>>;

    async fn row_security(&self, table: &str) -> Result<RowSecurity>;
}

/// Inspects a live PostgreSQL catalog.
#[derive(Debug, Clone)]
pub struct PgDeploymentInspector {
    pool: DbPool,
}

impl PgDeploymentInspector {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeploymentInspector for PgDeploymentInspector {
    async fn missing_columns(&self, table: &str, required: &[&str]) -> Result<Vec<String>> {
        let present: Vec<String> = sqlx::query_scalar(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(required
            .iter()
            .filter(|column| !present.iter().any(|p| p == *column))
            .map(|column| column.to_string())
            .collect())
    }

    async fn row_security(&self, table: &str) -> Result<RowSecurity> {
        let enabled: Option<bool> = sqlx::query_scalar(
            "SELECT c.relrowsecurity FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = current_schema() AND c.relname = $1",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;

        let policies: Vec<String> = sqlx::query_scalar(
            "SELECT policyname::text FROM pg_policies \
             WHERE schemaname = current_schema() AND tablename = $1 ORDER BY policyname",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(RowSecurity { enabled: enabled.unwrap_or(false), policies })
    }
}

/// Fixed answers, for the in-memory development mode and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDeploymentInspector {
    pub columns: Vec<String>,
    pub row_security: RowSecurity,
}

impl StaticDeploymentInspector {
    /// A deployment matching the embedded migrations.
    pub fn provisioned() -> Self {
        Self {
            columns: super::REQUIRED_CREDENTIAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            row_security: RowSecurity {
                enabled: true,
                policies: vec!["provider_credentials_owner".to_string()],
            },
        }
    }

    pub fn without_columns(mut self, missing: &[&str]) -> Self {
        self.columns.retain(|c| !missing.contains(&c.as_str()));
        self
    }
}

#[async_trait]
impl DeploymentInspector for StaticDeploymentInspector {
    async fn missing_columns(&self, _table: &str, required: &[&str]) -> Result<Vec<String>> {
        Ok(required
            .iter()
            .filter(|column| !self.columns.iter().any(|c| c == *column))
            .map(|column| column.to_string())
            .collect())
    }

    async fn row_security(&self, _table: &str) -> Result<RowSecurity> {
        Ok(self.row_security.clone())
    }
}
