//! Append-only persistence for security audit events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::event::SecurityAuditEvent;
use crate::errors::{GatewayError, Result};

/// Storage for the security audit trail.
///
/// Implementations only ever insert; there is no update or delete.
#[async_trait]
pub trait AuditEventStore: Send + Sync {
    async fn append(&self, event: &SecurityAuditEvent) -> Result<()>;

    /// Events by `user_id` at or after `since`, oldest first. Includes alerts.
    async fn recent_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SecurityAuditEvent>>;

    /// A page of the full trail, newest first.
    async fn query(&self, limit: i64, offset: i64) -> Result<Vec<SecurityAuditEvent>>;

    async fn count(&self) -> Result<i64>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<()>;
}

/// In-process audit trail for development mode and tests.
#[derive(Default)]
pub struct InMemoryAuditEventStore {
    events: RwLock<Vec<SecurityAuditEvent>>,
    failing: AtomicBool,
    append_delay_ms: AtomicU64,
}

impl InMemoryAuditEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `append` fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `append` wait this long before doing anything.
    pub fn set_append_delay(&self, delay: Duration) {
        self.append_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Snapshot of every stored event in insertion order.
    pub async fn all(&self) -> Vec<SecurityAuditEvent> {
        self.events.read().await.clone()
    }

    /// Stored events with the given operation name.
    pub async fn with_operation(&self, operation: &str) -> Vec<SecurityAuditEvent> {
        self.events.read().await.iter().filter(|e| e.operation == operation).cloned().collect()
    }
}

#[async_trait]
impl AuditEventStore for InMemoryAuditEventStore {
    async fn append(&self, event: &SecurityAuditEvent) -> Result<()> {
        let delay = self.append_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::store_unavailable("audit store unavailable"));
        }
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SecurityAuditEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.user_id == user_id && e.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn query(&self, limit: i64, offset: i64) -> Result<Vec<SecurityAuditEvent>> {
        let events = self.events.read().await;
        let mut ordered: Vec<_> = events.iter().cloned().collect();
        ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(ordered
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.events.read().await.len() as i64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
