//! Key Validator: credential shape checks and rotation-due computation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::providers::rule_for;
use crate::audit::{operations, RiskLevel, SecurityAuditEvent, SecurityAuditor};
use crate::config::SecurityPolicy;
use crate::lifecycle::SecretRecord;
use crate::secrets::SecretString;

/// Keys shorter than this many characters draw a warning.
pub const MIN_KEY_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    TooShort,
    Whitespace,
    PrefixMismatch,
    RotationDue,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::TooShort => "too_short",
            WarningKind::Whitespace => "whitespace",
            WarningKind::PrefixMismatch => "prefix_mismatch",
            WarningKind::RotationDue => "rotation_due",
        }
    }

    /// Problems with the key material itself, as opposed to its age or strength.
    pub fn is_format_problem(&self) -> bool {
        matches!(self, WarningKind::Whitespace | WarningKind::PrefixMismatch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SecurityWarning {
    pub kind: WarningKind,
    pub message: String,
}

/// Result of a security check. Never contains key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    /// True iff there are no warnings
    pub is_secure: bool,
    pub warnings: Vec<SecurityWarning>,
    pub recommendations: Vec<String>,
}

impl SecurityReport {
    fn from_findings(findings: Vec<(SecurityWarning, String)>) -> Self {
        let (warnings, recommendations): (Vec<_>, Vec<_>) = findings.into_iter().unzip();
        Self { is_secure: warnings.is_empty(), warnings, recommendations }
    }

    pub fn has(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    pub fn has_format_problem(&self) -> bool {
        self.warnings.iter().any(|w| w.kind.is_format_problem())
    }

    pub fn warning_kinds(&self) -> Vec<&'static str> {
        self.warnings.iter().map(|w| w.kind.as_str()).collect()
    }
}

/// Provider-aware credential checks. Every `validate_security` call is audited.
pub struct KeyValidator {
    policy: SecurityPolicy,
    auditor: Arc<SecurityAuditor>,
}

impl KeyValidator {
    pub fn new(policy: SecurityPolicy, auditor: Arc<SecurityAuditor>) -> Self {
        Self { policy, auditor }
    }

    /// True when the record's rotation clock has reached the policy interval.
    pub fn check_rotation_due(&self, record: &SecretRecord) -> bool {
        self.rotation_due_at(record, Utc::now())
    }

    pub fn rotation_due_at(&self, record: &SecretRecord, now: DateTime<Utc>) -> bool {
        (now - record.rotation_anchor()).num_days() >= self.policy.rotation_interval_days
    }

    /// Run the checks without recording anything.
    pub fn assess(
        &self,
        provider: &str,
        key: &SecretString,
        record: Option<&SecretRecord>,
        now: DateTime<Utc>,
    ) -> SecurityReport {
        let mut findings = Vec::new();
        let value = key.expose_secret();

        let length = key.char_len();
        if length < MIN_KEY_LENGTH {
            findings.push((
                SecurityWarning {
                    kind: WarningKind::TooShort,
                    message: format!(
                        "Key is {} characters; at least {} expected",
                        length, MIN_KEY_LENGTH
                    ),
                },
                "Generate a new key with the provider's default length".to_string(),
            ));
        }

        if value.chars().any(char::is_whitespace) {
            findings.push((
                SecurityWarning {
                    kind: WarningKind::Whitespace,
                    message: "Key contains whitespace".to_string(),
                },
                "Remove spaces and line breaks copied along with the key".to_string(),
            ));
        }

        if let Some(rule) = rule_for(provider) {
            if let Some(prefix) = rule.expected_prefix {
                if !value.starts_with(prefix) {
                    findings.push((
                        SecurityWarning {
                            kind: WarningKind::PrefixMismatch,
                            message: format!(
                                "{} keys usually start with '{}'",
                                rule.display_name, prefix
                            ),
                        },
                        format!("Confirm the key was issued by {}", rule.display_name),
                    ));
                }
            }
        }

        if let Some(record) = record {
            if self.rotation_due_at(record, now) {
                let age_days = (now - record.rotation_anchor()).num_days();
                findings.push((
                    SecurityWarning {
                        kind: WarningKind::RotationDue,
                        message: format!(
                            "Key was last validated {} days ago; rotation interval is {} days",
                            age_days, self.policy.rotation_interval_days
                        ),
                    },
                    "Rotate this key".to_string(),
                ));
            }
        }

        SecurityReport::from_findings(findings)
    }

    /// Run the checks and record the outcome as a `key_validation` audit event.
    pub async fn validate_security(
        &self,
        actor: &str,
        provider: &str,
        key: &SecretString,
        record: Option<&SecretRecord>,
    ) -> SecurityReport {
        let report = self.assess(provider, key, record, Utc::now());

        let mut event = SecurityAuditEvent::new(operations::KEY_VALIDATION, provider, actor)
            .success(report.is_secure)
            .risk(RiskLevel::from_warning_count(report.warnings.len()))
            .with_metadata("warning_count", report.warnings.len())
            .with_metadata("warnings", report.warning_kinds());
        if let Some(record) = record {
            event = event.with_metadata("secret_id", record.id.to_string());
        }
        self.auditor.record(event).await;

        tracing::debug!(
            provider = %provider,
            is_secure = report.is_secure,
            warnings = ?report.warning_kinds(),
            "Key security assessed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditEventStore;
    use crate::secrets::SecretRef;

    fn validator() -> (KeyValidator, Arc<InMemoryAuditEventStore>) {
        let store = Arc::new(InMemoryAuditEventStore::new());
        let auditor = Arc::new(SecurityAuditor::new(store.clone(), SecurityPolicy::default()));
        (KeyValidator::new(SecurityPolicy::default(), auditor), store)
    }

    fn record_created_days_ago(days: i64) -> SecretRecord {
        let mut record = SecretRecord::new(
            "user-1",
            "openai",
            SecretRef::new("r"),
            "****".into(),
            "sk-".into(),
            "d".into(),
        );
        record.created_at = Utc::now() - chrono::Duration::days(days);
        record
    }

    const GOOD_OPENAI_KEY: &str = "sk-proj-4f9a2c7e1b8d6f3a0c5e9b2d7f1a4c8e";

    #[test]
    fn test_secure_key_has_no_warnings() {
        let (validator, _) = validator();
        let report =
            validator.assess("openai", &SecretString::new(GOOD_OPENAI_KEY), None, Utc::now());
        assert!(report.is_secure);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_short_whitespace_and_prefix_warnings() {
        let (validator, _) = validator();
        let report = validator.assess("anthropic", &SecretString::new("abc def"), None, Utc::now());
        assert!(!report.is_secure);
        assert!(report.has(WarningKind::TooShort));
        assert!(report.has(WarningKind::Whitespace));
        assert!(report.has(WarningKind::PrefixMismatch));
        assert_eq!(report.recommendations.len(), 3);
    }

    #[test]
    fn test_unknown_provider_skips_prefix_check() {
        let (validator, _) = validator();
        let report = validator.assess(
            "acme",
            &SecretString::new("acme_0123456789abcdef0123456789abcdef"),
            None,
            Utc::now(),
        );
        assert!(report.is_secure);
    }

    #[test]
    fn test_rotation_due_at_91_days() {
        let (validator, _) = validator();
        let record = record_created_days_ago(91);
        assert!(validator.check_rotation_due(&record));

        let report =
            validator.assess("openai", &SecretString::new(GOOD_OPENAI_KEY), Some(&record), Utc::now());
        assert!(report.has(WarningKind::RotationDue));
        assert!(!report.is_secure);
    }

    #[test]
    fn test_rotation_not_due_before_interval() {
        let (validator, _) = validator();
        assert!(!validator.check_rotation_due(&record_created_days_ago(89)));
        assert!(validator.check_rotation_due(&record_created_days_ago(90)));

        let mut record = record_created_days_ago(200);
        record.last_validated_at = Some(Utc::now() - chrono::Duration::days(10));
        assert!(!validator.check_rotation_due(&record));
    }

    #[tokio::test]
    async fn test_validate_security_is_audited_without_key_material() {
        let (validator, store) = validator();
        let key = SecretString::new("sk-shortsecret");
        let report = validator.validate_security("user-1", "openai", &key, None).await;
        assert!(!report.is_secure);

        let events = store.with_operation(operations::KEY_VALIDATION).await;
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert_eq!(events[0].risk_level, RiskLevel::Medium);

        let json = serde_json::to_string(&events[0]).unwrap();
        assert!(!json.contains("sk-shortsecret"));
    }
}
