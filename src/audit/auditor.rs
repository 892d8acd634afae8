//! Security auditor: resilient audit writes plus anomaly detection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, warn};

use super::event::{operations, RiskLevel, SecurityAuditEvent, ANONYMOUS_ACTOR};
use super::store::AuditEventStore;
use crate::config::SecurityPolicy;
use crate::errors::Result;
use crate::observability::MetricsRecorder;

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(25);
const DEFAULT_BACKLOG_CAPACITY: usize = 1024;
/// Upper bound on the store calls made by one `record`, retries and alerts included.
const DEFAULT_WRITE_BUDGET: Duration = Duration::from_millis(750);

/// Records security events and scans recent history for abuse patterns.
///
/// `record` never fails from the caller's point of view and never waits longer
/// than the write budget. An append that still fails after the retries is
/// parked in a bounded local backlog; `flush_backlog` writes it out later.
pub struct SecurityAuditor {
    store: Arc<dyn AuditEventStore>,
    policy: SecurityPolicy,
    backlog: Mutex<VecDeque<SecurityAuditEvent>>,
    backlog_capacity: usize,
    max_retries: u32,
    retry_delay: Duration,
    write_budget: Duration,
    metrics: MetricsRecorder,
}

impl SecurityAuditor {
    pub fn new(store: Arc<dyn AuditEventStore>, policy: SecurityPolicy) -> Self {
        Self {
            store,
            policy,
            backlog: Mutex::new(VecDeque::new()),
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            write_budget: DEFAULT_WRITE_BUDGET,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Override retry count and base delay (the delay grows linearly per attempt).
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Override the time one `record` call may spend on the store.
    pub fn with_write_budget(mut self, budget: Duration) -> Self {
        self.write_budget = budget;
        self
    }

    pub fn with_backlog_capacity(mut self, capacity: usize) -> Self {
        self.backlog_capacity = capacity.max(1);
        self
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Record `event`, then run anomaly detection for its user.
    pub async fn record(&self, event: SecurityAuditEvent) {
        let deadline = Instant::now() + self.write_budget;

        if !self.persist(&event, deadline).await {
            self.park(event).await;
            return;
        }

        if !event.is_alert() && event.user_id != ANONYMOUS_ACTOR {
            self.scan(&event, deadline).await;
        }
    }

    /// Number of events waiting in the local backlog.
    pub async fn backlog_len(&self) -> usize {
        self.backlog.lock().await.len()
    }

    /// Write parked events until the backlog is empty or the store fails again.
    /// Returns the number of events still parked.
    ///
    /// The backlog lock is released while each event is written, so `record`
    /// can keep parking events during a slow flush.
    pub async fn flush_backlog(&self) -> usize {
        loop {
            let Some(event) = self.backlog.lock().await.pop_front() else {
                return 0;
            };

            let failure = match timeout(self.write_budget, self.store.append(&event)).await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "append timed out".to_string(),
            };

            let mut backlog = self.backlog.lock().await;
            debug!(error = %failure, remaining = backlog.len() + 1, "Audit backlog flush interrupted");
            backlog.push_front(event);
            return backlog.len();
        }
    }

    /// A page of the audit trail (newest first) and the total event count.
    pub async fn page(&self, limit: i64, offset: i64) -> Result<(Vec<SecurityAuditEvent>, i64)> {
        let entries = self.store.query(limit, offset).await?;
        let total = self.store.count().await?;
        Ok((entries, total))
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    /// Append with retries until `deadline`. Returns false when the event was not written.
    async fn persist(&self, event: &SecurityAuditEvent, deadline: Instant) -> bool {
        for attempt in 0..=self.max_retries {
            if Instant::now() >= deadline {
                break;
            }

            let failure = match timeout_at(deadline, self.store.append(event)).await {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "append timed out".to_string(),
            };
            warn!(
                attempt = attempt + 1,
                operation = %event.operation,
                user_id = %event.user_id,
                error = %failure,
                "Failed to write security audit event"
            );

            if attempt < self.max_retries {
                let pause = self.retry_delay * (attempt + 1);
                tokio::time::sleep(pause.min(deadline.saturating_duration_since(Instant::now())))
                    .await;
            }
        }

        self.metrics.record_audit_write_failure();
        false
    }

    async fn park(&self, event: SecurityAuditEvent) {
        let mut backlog = self.backlog.lock().await;
        if backlog.len() >= self.backlog_capacity {
            if let Some(dropped) = backlog.pop_front() {
                self.metrics.record_audit_backlog_dropped();
                error!(
                    event_id = %dropped.id,
                    operation = %dropped.operation,
                    "Audit backlog full, dropping oldest event"
                );
            }
        }
        error!(
            event_id = %event.id,
            operation = %event.operation,
            backlog = backlog.len() + 1,
            "Security audit event parked in local backlog"
        );
        backlog.push_back(event);
    }

    async fn scan(&self, trigger: &SecurityAuditEvent, deadline: Instant) {
        let since = trigger.timestamp - self.policy.activity_window();
        let recent =
            match timeout_at(deadline, self.store.recent_for_user(&trigger.user_id, since)).await {
                Ok(Ok(recent)) => recent,
                Ok(Err(e)) => {
                    warn!(user_id = %trigger.user_id, error = %e, "Anomaly scan skipped");
                    return;
                }
                Err(_) => {
                    warn!(user_id = %trigger.user_id, "Anomaly scan skipped, audit store too slow");
                    return;
                }
            };

        let already_alerted =
            |kind: &str| recent.iter().any(|event| event.operation == kind);

        let activity = recent.iter().filter(|event| !event.is_alert()).count();
        let threshold = self.policy.suspicious_activity_threshold as usize;
        if activity > threshold && !already_alerted(operations::HIGH_FREQUENCY_ALERT) {
            self.raise_alert(operations::HIGH_FREQUENCY_ALERT, trigger, activity, threshold, deadline)
                .await;
        }

        if trigger.is_failed_validation() {
            let failures = recent.iter().filter(|event| event.is_failed_validation()).count();
            let max = self.policy.max_failed_validations as usize;
            if failures > max && !already_alerted(operations::REPEATED_VALIDATION_FAILURES_ALERT) {
                self.raise_alert(
                    operations::REPEATED_VALIDATION_FAILURES_ALERT,
                    trigger,
                    failures,
                    max,
                    deadline,
                )
                .await;
            }
        }
    }

    async fn raise_alert(
        &self,
        kind: &'static str,
        trigger: &SecurityAuditEvent,
        observed: usize,
        threshold: usize,
        deadline: Instant,
    ) {
        warn!(
            alert = kind,
            user_id = %trigger.user_id,
            provider = %trigger.provider,
            observed,
            threshold,
            "Security alert raised"
        );
        self.metrics.record_alert(kind);

        let alert = SecurityAuditEvent::new(kind, trigger.provider.clone(), trigger.user_id.clone())
            .success(false)
            .risk(RiskLevel::High)
            .with_metadata("observed", observed)
            .with_metadata("threshold", threshold)
            .with_metadata("window_seconds", self.policy.activity_window_seconds)
            .with_metadata("trigger_operation", trigger.operation.clone())
            .with_metadata("trigger_event_id", trigger.id.to_string());

        if !self.persist(&alert, deadline).await {
            self.park(alert).await;
        }
    }
}
