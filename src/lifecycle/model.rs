//! Credential record and usage models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::GatewayError;
use crate::secrets::SecretRef;

/// Activation status of a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Error,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Error => "error",
            KeyStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KeyStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(KeyStatus::Active),
            "error" => Ok(KeyStatus::Error),
            "revoked" => Ok(KeyStatus::Revoked),
            other => Err(GatewayError::internal(format!("unknown key status '{}'", other))),
        }
    }
}

/// One provider credential owned by one user.
///
/// Holds only the opaque store reference and derived, display-safe fields;
/// the plaintext lives in the secret store alone.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub provider: String,
    pub secret_ref: SecretRef,
    pub masked_key: String,
    pub key_prefix: String,
    /// Hex SHA-256 of the plaintext
    pub key_digest: String,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
}

impl SecretRecord {
    /// A fresh active record created now.
    pub fn new(
        owner_id: impl Into<String>,
        provider: impl Into<String>,
        secret_ref: SecretRef,
        masked_key: String,
        key_prefix: String,
        key_digest: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            provider: provider.into(),
            secret_ref,
            masked_key,
            key_prefix,
            key_digest,
            status: KeyStatus::Active,
            created_at: Utc::now(),
            last_validated_at: None,
            last_used_at: None,
            rotated_at: None,
            revoked_at: None,
            revocation_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }

    pub fn is_revoked(&self) -> bool {
        self.status == KeyStatus::Revoked
    }

    /// Start of the rotation clock: last validation, else creation.
    pub fn rotation_anchor(&self) -> DateTime<Utc> {
        self.last_validated_at.unwrap_or(self.created_at)
    }
}

/// One recorded use of a credential against its provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: Uuid,
    pub secret_id: Uuid,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
    pub success: bool,
    /// Provider-reported cost in USD
    pub cost: f64,
    pub request_type: Option<String>,
}

impl UsageRecord {
    pub fn new(secret_id: Uuid, user_id: impl Into<String>, success: bool, cost: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            secret_id,
            user_id: user_id.into(),
            occurred_at: Utc::now(),
            success,
            cost,
            request_type: None,
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SecretRecord {
        SecretRecord::new(
            "user-1",
            "openai",
            SecretRef::new("ref"),
            "sk-p****wxyz".into(),
            "sk-".into(),
            "ab".into(),
        )
    }

    #[test]
    fn test_rotation_anchor_prefers_last_validation() {
        let mut record = record();
        assert_eq!(record.rotation_anchor(), record.created_at);

        let validated = record.created_at + chrono::Duration::days(3);
        record.last_validated_at = Some(validated);
        assert_eq!(record.rotation_anchor(), validated);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [KeyStatus::Active, KeyStatus::Error, KeyStatus::Revoked] {
            assert_eq!(status.as_str().parse::<KeyStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<KeyStatus>().is_err());
    }
}
