//! Postgres vault extension backend.
//!
//! Uses the `supabase_vault` extension: secrets are written through
//! `vault.create_secret`, read back through the `vault.decrypted_secrets`
//! view and removed from `vault.secrets`. The secret's row id is the opaque
//! reference.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use super::client::{bounded, validate_secret_name, SecretStore};
use super::error::{Result, SecretsError};
use super::types::{SecretRef, SecretString};

const VAULT_EXTENSION: &str = "supabase_vault";

/// Secret store backed by the Postgres vault extension.
#[derive(Debug, Clone)]
pub struct PgVaultSecretStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgVaultSecretStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    fn parse_reference(reference: &SecretRef) -> Result<uuid::Uuid> {
        uuid::Uuid::parse_str(reference.as_str())
            .map_err(|_| SecretsError::not_found(reference.as_str()))
    }
}

#[async_trait]
impl SecretStore for PgVaultSecretStore {
    fn backend_name(&self) -> &'static str {
        "postgres_vault"
    }

    async fn create(&self, name: &str, plaintext: &SecretString) -> Result<SecretRef> {
        validate_secret_name(name)?;

        let id: String = bounded("create", self.timeout, async {
            sqlx::query_scalar::<_, String>("SELECT vault.create_secret($1, $2, $3)::text")
                .bind(plaintext.expose_secret())
                .bind(name)
                .bind("provider credential managed by credgate")
                .fetch_one(&self.pool)
                .await
                .map_err(SecretsError::from)
        })
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, name = %name, "Failed to create vault secret");
        })?;

        tracing::info!(name = %name, reference = %id, "Stored secret in Postgres vault");
        Ok(SecretRef::new(id))
    }

    async fn fetch(&self, reference: &SecretRef) -> Result<SecretString> {
        let id = Self::parse_reference(reference)?;

        let value: Option<String> = bounded("fetch", self.timeout, async {
            sqlx::query_scalar::<_, Option<String>>(
                "SELECT decrypted_secret FROM vault.decrypted_secrets WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map(Option::flatten)
            .map_err(SecretsError::from)
        })
        .await?;

        value.map(SecretString::new).ok_or_else(|| SecretsError::not_found(reference.as_str()))
    }

    async fn delete(&self, reference: &SecretRef) -> Result<()> {
        let id = Self::parse_reference(reference)?;

        let result = bounded("delete", self.timeout, async {
            sqlx::query("DELETE FROM vault.secrets WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(SecretsError::from)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(SecretsError::not_found(reference.as_str()));
        }

        tracing::info!(reference = %reference, "Deleted secret from Postgres vault");
        Ok(())
    }

    async fn probe(&self) -> Result<String> {
        let version: Option<String> = bounded("probe", self.timeout, async {
            sqlx::query_scalar::<_, String>(
                "SELECT extversion FROM pg_extension WHERE extname = $1",
            )
            .bind(VAULT_EXTENSION)
            .fetch_optional(&self.pool)
            .await
            .map_err(SecretsError::from)
        })
        .await?;

        match version {
            Some(version) => Ok(format!("{} extension installed (version {})", VAULT_EXTENSION, version)),
            None => Err(SecretsError::config_error(format!(
                "{} extension is not installed",
                VAULT_EXTENSION
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_uuid_reference_is_not_found() {
        let result = PgVaultSecretStore::parse_reference(&SecretRef::new("not-a-uuid"));
        assert!(matches!(result, Err(SecretsError::NotFound { .. })));
    }

    #[test]
    fn test_uuid_reference_parses() {
        let id = uuid::Uuid::new_v4();
        let parsed = PgVaultSecretStore::parse_reference(&SecretRef::new(id.to_string())).unwrap();
        assert_eq!(parsed, id);
    }
}
