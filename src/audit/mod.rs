//! Security Auditor.
//!
//! Append-only trail of every security-relevant operation, plus anomaly
//! detection over each user's recent history. Alerts are ordinary
//! [`SecurityAuditEvent`]s with risk level high, so they are queried the same
//! way as the events that triggered them.

pub mod auditor;
pub mod event;
pub mod store;

pub use auditor::SecurityAuditor;
pub use event::{operations, RiskLevel, SecurityAuditEvent, ANONYMOUS_ACTOR, SYSTEM_PROVIDER};
pub use store::{AuditEventStore, InMemoryAuditEventStore};
