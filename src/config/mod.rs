//! # Configuration Management
//!
//! All settings are read from the environment (`CREDGATE_*` plus the
//! conventional `DATABASE_URL`, `VAULT_ADDR` and `VAULT_TOKEN`). The binary
//! loads a `.env` file first when one is present.

pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, IdentityConfig, IdentityMode, ObservabilityConfig,
    RateLimitConfig, SecretBackend, SecretStoreConfig, SecurityPolicy, ServerConfig,
};
