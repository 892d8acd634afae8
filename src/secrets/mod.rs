//! Secret Store Gateway.
//!
//! The only component that ever sees plaintext provider credentials. Every
//! other part of the gateway holds a [`SecretRef`] and the masked display form.
//!
//! # Backends
//!
//! - [`PgVaultSecretStore`]: Postgres vault extension (`vault.create_secret`)
//! - [`VaultSecretStore`]: HashiCorp Vault KV v2
//! - [`InMemorySecretStore`]: development mode and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use credgate::secrets::{InMemorySecretStore, SecretStore, SecretString};
//!
//! let store = InMemorySecretStore::new();
//! let reference = store.create("provider_key_user-1_openai", &SecretString::new("sk-...")).await?;
//! let value = store.fetch(&reference).await?;
//! store.delete(&reference).await?;
//! ```
//!
//! # Security Considerations
//!
//! - Plaintext only crosses this boundary on the calling stack of
//!   `create`/`fetch`/`delete`; it is never cached or logged.
//! - [`SecretString`] redacts itself in Debug, Display and serialization and
//!   zeroes its buffer on drop.
//! - Every backend call is bounded by a timeout and is never retried here.

pub mod client;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod types;
pub mod vault;

pub use client::{validate_secret_name, SecretStore};
pub use error::{Result, SecretsError};
pub use memory::InMemorySecretStore;
pub use postgres::PgVaultSecretStore;
pub use types::{SecretRef, SecretString};
pub use vault::{VaultConfig, VaultSecretStore};
