//! In-process secret store for development mode and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::client::{validate_secret_name, SecretStore};
use super::error::{Result, SecretsError};
use super::types::{SecretRef, SecretString};

struct StoredSecret {
    name: String,
    value: SecretString,
}

/// Secret store that keeps values in process memory.
///
/// Failure injection switches make the unavailable and failed-cleanup paths
/// reachable from tests.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, StoredSecret>>,
    unavailable: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`SecretsError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `delete` fail while other calls keep working.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of secrets currently held.
    pub async fn len(&self) -> usize {
        self.secrets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.secrets.read().await.is_empty()
    }

    /// Whether a live secret exists under `reference`.
    pub async fn contains(&self, reference: &SecretRef) -> bool {
        self.secrets.read().await.contains_key(reference.as_str())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SecretsError::unavailable("in-memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, name: &str, plaintext: &SecretString) -> Result<SecretRef> {
        self.check_available()?;
        validate_secret_name(name)?;

        let mut secrets = self.secrets.write().await;
        if secrets.values().any(|s| s.name == name) {
            return Err(SecretsError::backend_error(format!("secret '{}' already exists", name)));
        }

        let reference = uuid::Uuid::new_v4().to_string();
        secrets.insert(
            reference.clone(),
            StoredSecret { name: name.to_string(), value: plaintext.clone() },
        );
        Ok(SecretRef::new(reference))
    }

    async fn fetch(&self, reference: &SecretRef) -> Result<SecretString> {
        self.check_available()?;
        self.secrets
            .read()
            .await
            .get(reference.as_str())
            .map(|s| s.value.clone())
            .ok_or_else(|| SecretsError::not_found(reference.as_str()))
    }

    async fn delete(&self, reference: &SecretRef) -> Result<()> {
        self.check_available()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(SecretsError::unavailable("delete rejected by in-memory store"));
        }
        self.secrets
            .write()
            .await
            .remove(reference.as_str())
            .map(|_| ())
            .ok_or_else(|| SecretsError::not_found(reference.as_str()))
    }

    async fn probe(&self) -> Result<String> {
        self.check_available()?;
        Ok("in-memory store ready".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_create_fetch_delete() {
        let store = InMemorySecretStore::new();
        let value = SecretString::new("sk-test-value-1234567890");

        let reference = store.create("provider_key_one", &value).await.unwrap();
        assert_eq!(store.fetch(&reference).await.unwrap(), value);

        store.delete(&reference).await.unwrap();
        assert!(matches!(store.fetch(&reference).await, Err(SecretsError::NotFound { .. })));
        assert!(matches!(store.delete(&reference).await, Err(SecretsError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let store = InMemorySecretStore::new();
        let value = SecretString::new("value");
        store.create("dup", &value).await.unwrap();
        assert!(store.create("dup", &value).await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_switch() {
        let store = InMemorySecretStore::new();
        store.set_unavailable(true);
        let result = store.create("name", &SecretString::new("v")).await;
        assert!(matches!(result, Err(SecretsError::Unavailable { .. })));
        assert!(store.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_fail_deletes_keeps_secret() {
        let store = InMemorySecretStore::new();
        let reference = store.create("keep", &SecretString::new("v")).await.unwrap();
        store.set_fail_deletes(true);
        assert!(store.delete(&reference).await.is_err());
        assert!(store.contains(&reference).await);
    }

    proptest! {
        #[test]
        fn prop_round_trip_returns_written_value(value in "\\PC{1,200}") {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = InMemorySecretStore::new();
                let secret = SecretString::new(value.clone());
                let reference = store.create("round_trip", &secret).await.unwrap();
                let fetched = store.fetch(&reference).await.unwrap();
                prop_assert_eq!(fetched.expose_secret(), value.as_str());
                Ok(())
            })?;
        }
    }
}
