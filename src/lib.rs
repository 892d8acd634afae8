//! # credgate
//!
//! Secret lifecycle and access-control gateway for third-party AI provider
//! credentials. Users hand the gateway a provider API key once; afterwards
//! only an opaque reference, a masked form and a digest are visible outside
//! the secret store.
//!
//! ## Architecture
//!
//! ```text
//! HTTP boundary (guards, identity, rate limit)
//!      ↓
//! Key Lifecycle ──→ Key Validator ──→ Security Auditor
//!      ↓                                   ↓
//! Secret Store                       Audit Event Store
//! ```
//!
//! ## Core Components
//!
//! - **Secret Store**: create/fetch/delete behind [`secrets::SecretStore`]
//!   (Postgres vault extension, HashiCorp Vault, or in-memory)
//! - **Identity**: bearer token to [`identity::IdentityContext`], anonymous on failure
//! - **Rate Limiter**: fixed-window counters per user or client address
//! - **Security Auditor**: resilient append-only audit trail with anomaly alerts
//! - **Key Lifecycle**: store, rotate, revoke, validate and usage reporting
//! - **Vault Health Auditor**: deployment self-test battery

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod errors;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod ratelimit;
pub mod secrets;
pub mod storage;
pub mod validation;
pub mod vault_audit;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{GatewayError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "credgate");
    }
}
