//! Core secret store trait.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use super::error::{Result, SecretsError};
use super::types::{SecretRef, SecretString};

/// Maximum length of a secret name.
const MAX_NAME_LEN: usize = 128;

/// Opaque create/fetch/delete of named secret values.
///
/// This is the only seam through which plaintext credentials travel. Values
/// exist on the calling stack of these methods and nowhere else: they are not
/// cached, not logged, and not echoed in errors.
///
/// Failures are never retried inside an implementation; the caller decides
/// what a failed store call means for its operation.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Short backend identifier used in logs and health reports.
    fn backend_name(&self) -> &'static str;

    /// Store `plaintext` under `name` and return the store-assigned reference.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::InvalidName`] if the name is rejected
    /// - [`SecretsError::Unavailable`] / [`SecretsError::Timeout`] if the backend fails
    async fn create(&self, name: &str, plaintext: &SecretString) -> Result<SecretRef>;

    /// Read the plaintext behind `reference`.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::NotFound`] if nothing is stored under the reference
    /// - [`SecretsError::Unavailable`] / [`SecretsError::Timeout`] if the backend fails
    async fn fetch(&self, reference: &SecretRef) -> Result<SecretString>;

    /// Physically remove the secret behind `reference`.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::NotFound`] if nothing is stored under the reference
    /// - [`SecretsError::Unavailable`] / [`SecretsError::Timeout`] if the backend fails
    async fn delete(&self, reference: &SecretRef) -> Result<()>;

    /// Verify the backing capability (extension, mount) is present.
    ///
    /// Returns a short human-readable description on success.
    async fn probe(&self) -> Result<String>;
}

/// Validates a secret name before it reaches a backend.
///
/// Names are used as Vault paths and as vault row names, so path separators,
/// traversal sequences and whitespace are rejected.
pub fn validate_secret_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SecretsError::invalid_name(name, "name cannot be empty"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(SecretsError::invalid_name(
            name,
            format!("exceeds maximum length of {} characters", MAX_NAME_LEN),
        ));
    }

    if name.contains("..") {
        return Err(SecretsError::invalid_name(name, "cannot contain '..'"));
    }

    if let Some(bad) =
        name.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(SecretsError::invalid_name(name, format!("invalid character '{}'", bad)));
    }

    Ok(())
}

/// Bound a backend call so a slow dependency cannot stall the request pool.
pub(crate) async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation = %operation,
                timeout_ms = limit.as_millis() as u64,
                "secret store call timed out"
            );
            Err(SecretsError::timeout(operation, limit.as_millis() as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_secret_name_accepts_typical_names() {
        assert!(validate_secret_name("provider_key_user-1_openai_3f0c2a8e").is_ok());
        assert!(validate_secret_name("credgate.health.probe").is_ok());
    }

    #[test]
    fn test_validate_secret_name_rejects_bad_names() {
        assert!(validate_secret_name("").is_err());
        assert!(validate_secret_name("a/b").is_err());
        assert!(validate_secret_name("..hidden").is_err());
        assert!(validate_secret_name("has space").is_err());
        assert!(validate_secret_name(&"x".repeat(129)).is_err());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded("fetch", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(SecretsError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded("fetch", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
