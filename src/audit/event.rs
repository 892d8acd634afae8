//! Security audit event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::GatewayError;

/// Operation names written to the audit trail.
pub mod operations {
    pub const STORE: &str = "store";
    pub const ROTATE: &str = "rotate";
    pub const REVOKE: &str = "revoke";
    pub const VALIDATE: &str = "validate";
    pub const KEY_VALIDATION: &str = "key_validation";
    pub const USAGE_REPORT: &str = "usage_report";
    pub const AUDIT_LOG_READ: &str = "audit_log_read";
    pub const BLOCKED_CALLER: &str = "blocked_caller";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const VAULT_HEALTH_CHECK: &str = "vault_health_check";

    /// Raised when a user's event count in the activity window exceeds the threshold
    pub const HIGH_FREQUENCY_ALERT: &str = "high_frequency_operations";
    /// Raised when failed key validations in the activity window pass the maximum
    pub const REPEATED_VALIDATION_FAILURES_ALERT: &str = "repeated_validation_failures";

    pub const ALERTS: &[&str] = &[HIGH_FREQUENCY_ALERT, REPEATED_VALIDATION_FAILURES_ALERT];
}

/// Provider value used for events not tied to a credential.
pub const SYSTEM_PROVIDER: &str = "system";

/// Actor recorded for unauthenticated callers.
pub const ANONYMOUS_ACTOR: &str = "anonymous";

/// Coarse severity attached to every audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    /// Risk for a validation result with `warnings` findings.
    pub fn from_warning_count(warnings: usize) -> Self {
        match warnings {
            0 => RiskLevel::Low,
            1 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(GatewayError::internal(format!("unknown risk level '{}'", other))),
        }
    }
}

/// One append-only entry in the security audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAuditEvent {
    pub id: Uuid,
    pub operation: String,
    /// Provider identifier, or `system`
    pub provider: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub risk_level: RiskLevel,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SecurityAuditEvent {
    /// Successful low-risk event; adjust with the builder methods.
    pub fn new(
        operation: impl Into<String>,
        provider: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation: operation.into(),
            provider: provider.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            success: true,
            risk_level: RiskLevel::Low,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Mark the event failed and attach the sanitized error code and message.
    pub fn with_error(self, error: &GatewayError) -> Self {
        self.success(false)
            .with_metadata("error_code", error.code())
            .with_metadata("error", error.sanitized_message())
    }

    pub fn is_alert(&self) -> bool {
        operations::ALERTS.contains(&self.operation.as_str())
    }

    /// Whether this event counts as a failed key validation.
    pub fn is_failed_validation(&self) -> bool {
        self.operation == operations::KEY_VALIDATION && !self.success
    }
}
