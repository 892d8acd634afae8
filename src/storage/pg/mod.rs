//! PostgreSQL implementations of the gateway's persistence seams.

pub mod audit_log;
pub mod credentials;
pub mod usage;

pub use audit_log::PgAuditEventStore;
pub use credentials::PgSecretRecordRepository;
pub use usage::PgUsageRepository;
