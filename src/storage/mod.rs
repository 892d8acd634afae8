//! # Storage and Persistence
//!
//! PostgreSQL connectivity, embedded migrations, and the Postgres
//! implementations of the credential, usage and audit repositories.

pub mod migrations;
pub mod pg;
pub mod pool;

#[cfg(all(test, feature = "postgres_tests"))]
pub mod test_helpers;

pub use crate::config::DatabaseConfig;

pub use migrations::{
    get_migration_version, list_applied_migrations, run_migrations, validate_migrations,
    MigrationInfo,
};
pub use pg::{PgAuditEventStore, PgSecretRecordRepository, PgUsageRepository};
pub use pool::{check_connection, create_pool, sanitize_url, DbPool};
