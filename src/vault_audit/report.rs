//! Point-in-time vault health report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Warning => "warning",
            CheckStatus::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Critical,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Healthy => "healthy",
            OverallStatus::Degraded => "degraded",
            OverallStatus::Critical => "critical",
        }
    }

    /// `critical` if any check failed, `degraded` if any warned, else `healthy`.
    pub fn from_checks(checks: &[CheckResult]) -> Self {
        if checks.iter().any(|c| c.status == CheckStatus::Fail) {
            OverallStatus::Critical
        } else if checks.iter().any(|c| c.status == CheckStatus::Warning) {
            OverallStatus::Degraded
        } else {
            OverallStatus::Healthy
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckResult {
    pub component: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl CheckResult {
    fn new(component: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self { component: component.to_string(), status, message: message.into(), details: None }
    }

    pub fn pass(component: &str, message: impl Into<String>) -> Self {
        Self::new(component, CheckStatus::Pass, message)
    }

    pub fn warning(component: &str, message: impl Into<String>) -> Self {
        Self::new(component, CheckStatus::Warning, message)
    }

    pub fn fail(component: &str, message: impl Into<String>) -> Self {
        Self::new(component, CheckStatus::Fail, message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Result of one vault health audit run. Never persisted as a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VaultAuditReport {
    pub overall_status: OverallStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: Vec<CheckResult>,
    pub recommendations: Vec<String>,
}

impl VaultAuditReport {
    pub fn failed(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Warning)
    }

    pub fn check(&self, component: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.component == component)
    }
}
