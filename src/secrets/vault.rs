//! HashiCorp Vault secret store backend.
//!
//! Stores each credential as its own KV v2 entry under the configured mount.
//! The entry path doubles as the opaque reference, so a rotated credential
//! gets a fresh path and the superseded one can be deleted independently.
//!
//! # Configuration
//!
//! - `VAULT_ADDR`: Vault server address
//! - `VAULT_TOKEN`: Authentication token
//! - `VAULT_NAMESPACE`: Optional namespace
//! - `VAULT_MOUNT_PATH`: KV v2 mount path (default: "secret")

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use super::client::{bounded, validate_secret_name, SecretStore};
use super::error::{Result, SecretsError};
use super::types::{SecretRef, SecretString};

/// Field name used inside each KV entry.
const VALUE_FIELD: &str = "value";

/// Configuration for HashiCorp Vault backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault server address (e.g., "https://vault.example.com:8200")
    pub address: String,

    /// Vault authentication token
    pub token: Option<String>,

    /// Vault namespace (for Enterprise multi-tenancy)
    pub namespace: Option<String>,

    /// KV v2 mount path (default: "secret")
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Upper bound for every call to Vault, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_mount_path() -> String {
    "secret".to_string()
}

fn default_timeout_seconds() -> u64 {
    5
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            mount_path: default_mount_path(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl VaultConfig {
    /// Reads `VAULT_ADDR`, `VAULT_TOKEN`, `VAULT_NAMESPACE`, `VAULT_MOUNT_PATH`
    /// and `CREDGATE_SECRET_STORE_TIMEOUT_SECONDS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            address: std::env::var("VAULT_ADDR").unwrap_or(defaults.address),
            token: std::env::var("VAULT_TOKEN").ok(),
            namespace: std::env::var("VAULT_NAMESPACE").ok(),
            mount_path: std::env::var("VAULT_MOUNT_PATH").unwrap_or(defaults.mount_path),
            timeout_seconds: std::env::var("CREDGATE_SECRET_STORE_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// HashiCorp Vault secret store.
///
/// This client is `Send + Sync` and can be shared across request handlers.
pub struct VaultSecretStore {
    client: VaultClient,
    mount_path: String,
    timeout: Duration,
}

impl VaultSecretStore {
    /// Creates a new Vault secret store and checks that Vault answers.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::ConfigError`] if configuration is invalid
    /// - [`SecretsError::Unavailable`] if Vault is unreachable
    pub async fn new(config: VaultConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(SecretsError::config_error("Vault address cannot be empty"));
        }

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(ref token) = config.token {
            settings_builder.token(token);
        }

        if let Some(namespace) = config.namespace.clone() {
            settings_builder.namespace(Some(namespace));
        }

        settings_builder.timeout(Some(config.timeout()));

        let settings = settings_builder.build().map_err(|e| {
            SecretsError::config_error(format!("Invalid Vault configuration: {}", e))
        })?;

        let client = VaultClient::new(settings).map_err(|e| {
            SecretsError::unavailable(format!("Failed to create Vault client: {}", e))
        })?;

        let timeout = config.timeout();
        bounded("health", timeout, async {
            vaultrs::sys::health(&client)
                .await
                .map_err(|e| SecretsError::unavailable(format!("Vault health check failed: {}", e)))
        })
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, address = %config.address, "Failed to connect to Vault");
        })?;

        tracing::info!(address = %config.address, mount_path = %config.mount_path, "Connected to Vault");
        Ok(Self { client, mount_path: config.mount_path, timeout })
    }

    fn map_client_error(reference: &str, error: ClientError) -> SecretsError {
        match error {
            ClientError::APIError { code: 404, .. } => SecretsError::not_found(reference),
            other => SecretsError::unavailable(other.to_string()),
        }
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    fn backend_name(&self) -> &'static str {
        "vault"
    }

    async fn create(&self, name: &str, plaintext: &SecretString) -> Result<SecretRef> {
        validate_secret_name(name)?;

        let mut data = HashMap::new();
        data.insert(VALUE_FIELD.to_string(), plaintext.expose_secret().to_string());

        let result = bounded("create", self.timeout, async {
            kv2::set(&self.client, &self.mount_path, name, &data)
                .await
                .map_err(|e| Self::map_client_error(name, e))
        })
        .await;

        // The map holds a plaintext copy; clear it before returning.
        if let Some(value) = data.get_mut(VALUE_FIELD) {
            zeroize::Zeroize::zeroize(value);
        }

        result.inspect_err(|e| {
            tracing::error!(error = %e, name = %name, "Failed to write secret to Vault");
        })?;

        tracing::info!(name = %name, mount_path = %self.mount_path, "Stored secret in Vault");
        Ok(SecretRef::new(name))
    }

    async fn fetch(&self, reference: &SecretRef) -> Result<SecretString> {
        let key = reference.as_str();
        let mut secret: HashMap<String, String> = bounded("fetch", self.timeout, async {
            kv2::read(&self.client, &self.mount_path, key)
                .await
                .map_err(|e| Self::map_client_error(key, e))
        })
        .await?;

        secret
            .remove(VALUE_FIELD)
            .map(SecretString::new)
            .ok_or_else(|| SecretsError::backend_error(format!("Secret '{}' has no value field", key)))
    }

    async fn delete(&self, reference: &SecretRef) -> Result<()> {
        let key = reference.as_str();
        bounded("delete", self.timeout, async {
            kv2::delete_metadata(&self.client, &self.mount_path, key)
                .await
                .map_err(|e| Self::map_client_error(key, e))
        })
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, reference = %key, "Failed to delete secret from Vault");
        })?;

        tracing::info!(reference = %key, mount_path = %self.mount_path, "Deleted secret from Vault");
        Ok(())
    }

    async fn probe(&self) -> Result<String> {
        let mounts = bounded("probe", self.timeout, async {
            vaultrs::sys::mount::list(&self.client)
                .await
                .map_err(|e| SecretsError::unavailable(format!("Failed to list mounts: {}", e)))
        })
        .await?;

        let mount_key = format!("{}/", self.mount_path.trim_end_matches('/'));
        match mounts.get(&mount_key) {
            Some(mount) if mount.mount_type == "kv" => {
                Ok(format!("KV mount '{}' present", self.mount_path))
            }
            Some(mount) => Err(SecretsError::config_error(format!(
                "Mount '{}' has type '{}', expected 'kv'",
                self.mount_path, mount.mount_type
            ))),
            None => Err(SecretsError::config_error(format!(
                "KV mount '{}' is not enabled",
                self.mount_path
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_config_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.mount_path, "secret");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_vault_config_deserializes_with_defaults() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"address":"https://vault.internal:8200","token":null,"namespace":null}"#)
                .unwrap();
        assert_eq!(config.mount_path, "secret");
        assert_eq!(config.timeout_seconds, 5);
    }

    #[tokio::test]
    async fn test_empty_address_is_config_error() {
        let config = VaultConfig { address: String::new(), ..Default::default() };
        let result = VaultSecretStore::new(config).await;
        assert!(matches!(result, Err(SecretsError::ConfigError { .. })));
    }

    #[test]
    fn test_not_found_mapping() {
        let err = VaultSecretStore::map_client_error(
            "provider_key_a",
            ClientError::APIError { code: 404, errors: vec![] },
        );
        assert!(matches!(err, SecretsError::NotFound { .. }));

        let err = VaultSecretStore::map_client_error(
            "provider_key_a",
            ClientError::APIError { code: 503, errors: vec!["sealed".into()] },
        );
        assert!(matches!(err, SecretsError::Unavailable { .. }));
    }
}
