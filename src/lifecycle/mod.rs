//! # Key Lifecycle
//!
//! Per-record state machine for stored provider credentials:
//!
//! ```text
//! active --rotate--> active (new reference)
//! active --revoke--> revoked
//! active|error --validate--> active|error
//! ```
//!
//! Records are never hard-deleted; revocation is a status change.

pub mod model;
pub mod repository;
pub mod service;

pub use model::{KeyStatus, SecretRecord, UsageRecord};
pub use repository::{
    InMemorySecretRecordRepository, InMemoryUsageRepository, SecretRecordRepository,
    UsageRepository,
};
pub use service::{
    clamp_page, usage_range, AuditLogPage, KeyInfo, KeyLifecycleService, KeyValidation,
    Pagination, RevokedKey, RotatedKey, StoredKey, UsageReport,
};
