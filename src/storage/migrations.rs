//! # Database Migration Management
//!
//! SQL migrations under `migrations/` are embedded in the binary and applied
//! in filename order. Each applied file is recorded in `_credgate_migrations`
//! together with a SHA-256 checksum of its contents.

use crate::errors::{GatewayError, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::{error, info, warn};

/// Embedded migrations as `(filename, sql)`, sorted by filename.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "20260301000001_create_provider_credentials",
        include_str!("../../migrations/20260301000001_create_provider_credentials.sql"),
    ),
    (
        "20260301000002_create_security_audit_log",
        include_str!("../../migrations/20260301000002_create_security_audit_log.sql"),
    ),
    (
        "20260301000003_create_credential_usage",
        include_str!("../../migrations/20260301000003_create_credential_usage.sql"),
    ),
    (
        "20260301000004_enable_row_level_security",
        include_str!("../../migrations/20260301000004_enable_row_level_security.sql"),
    ),
];

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: chrono::DateTime<chrono::Utc>,
    pub execution_time: i64,
    pub checksum: Vec<u8>,
}

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<usize> {
    info!("Starting database migration process");
    create_migration_table(pool).await?;

    let applied = get_applied_migration_versions(pool).await?;
    let mut migrations_run = 0;

    for (filename, sql) in MIGRATIONS {
        let version = extract_version_from_filename(filename)?;
        if applied.contains(&version) {
            continue;
        }

        info!(version = version, "Running migration: {}", filename);
        let start_time = std::time::Instant::now();

        let mut tx = pool.begin().await?;

        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
            error!(error = %e, migration = filename, "Migration failed");
            GatewayError::internal(format!("Migration failed: {}", filename))
        })?;

        let execution_time = start_time.elapsed().as_millis() as i64;
        sqlx::query(
            "INSERT INTO _credgate_migrations (version, description, checksum, execution_time, installed_on) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(version)
        .bind(*filename)
        .bind(calculate_checksum(sql))
        .bind(execution_time)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        migrations_run += 1;
        info!(version = version, execution_time_ms = execution_time, "Migration completed: {}", filename);
    }

    if migrations_run > 0 {
        info!(count = migrations_run, "Database migrations completed");
    } else {
        info!("No pending migrations");
    }

    Ok(migrations_run)
}

async fn create_migration_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _credgate_migrations (
            version BIGINT PRIMARY KEY,
            description TEXT NOT NULL,
            checksum BYTEA NOT NULL,
            execution_time BIGINT NOT NULL,
            installed_on TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
    "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn get_applied_migration_versions(pool: &DbPool) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT version FROM _credgate_migrations ORDER BY version")
        .fetch_all(pool)
        .await;

    match rows {
        Ok(rows) => Ok(rows.into_iter().map(|row| row.get::<i64, _>("version")).collect()),
        Err(sqlx::Error::Database(db_err))
            if db_err.message().contains("relation \"_credgate_migrations\" does not exist") =>
        {
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn extract_version_from_filename(filename: &str) -> Result<i64> {
    filename
        .split('_')
        .next()
        .and_then(|version| version.parse::<i64>().ok())
        .ok_or_else(|| GatewayError::internal(format!("Invalid migration filename: {}", filename)))
}

fn calculate_checksum(content: &str) -> Vec<u8> {
    Sha256::digest(content.as_bytes()).to_vec()
}

/// True when every embedded migration is applied with a matching checksum.
pub async fn validate_migrations(pool: &DbPool) -> Result<bool> {
    let applied = list_applied_migrations(pool).await?;

    for (filename, sql) in MIGRATIONS {
        let version = extract_version_from_filename(filename)?;
        match applied.iter().find(|m| m.version == version) {
            None => {
                warn!(version = version, "Missing migration");
                return Ok(false);
            }
            Some(info) if info.checksum != calculate_checksum(sql) => {
                warn!(version = version, "Migration checksum mismatch");
                return Ok(false);
            }
            Some(_) => {}
        }
    }

    Ok(true)
}

/// Get the current migration version (highest applied)
pub async fn get_migration_version(pool: &DbPool) -> Result<i64> {
    let applied = get_applied_migration_versions(pool).await?;
    Ok(applied.into_iter().max().unwrap_or(0))
}

/// List all applied migrations
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    let rows = sqlx::query(
        "SELECT version, description, checksum, execution_time, installed_on FROM _credgate_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await;

    match rows {
        Ok(rows) => Ok(rows
            .into_iter()
            .map(|row| MigrationInfo {
                version: row.get("version"),
                description: row.get("description"),
                installed_on: row.get("installed_on"),
                execution_time: row.get("execution_time"),
                checksum: row.get("checksum"),
            })
            .collect()),
        Err(sqlx::Error::Database(db_err))
            if db_err.message().contains("relation \"_credgate_migrations\" does not exist") =>
        {
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations_are_sorted_and_versioned() {
        let versions: Vec<i64> = MIGRATIONS
            .iter()
            .map(|(name, _)| extract_version_from_filename(name).unwrap())
            .collect();
        let mut sorted = versions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_credential_table_has_required_columns() {
        let sql = MIGRATIONS[0].1;
        for column in crate::vault_audit::REQUIRED_CREDENTIAL_COLUMNS {
            assert!(sql.contains(column), "missing column {}", column);
        }
    }

    #[test]
    fn test_extract_version_rejects_garbage() {
        assert!(extract_version_from_filename("init_schema").is_err());
        assert_eq!(extract_version_from_filename("42_x").unwrap(), 42);
    }

    #[test]
    fn test_checksum_is_sha256() {
        assert_eq!(calculate_checksum("abc").len(), 32);
    }
}
