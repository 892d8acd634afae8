//! # Key Validation
//!
//! Provider-specific credential checks, rotation-due computation and the
//! display-safe derivations (masked form, prefix marker, digest) stored on a
//! credential record.

pub mod masking;
pub mod providers;
pub mod validator;

pub use masking::{key_digest, key_prefix, mask_key};
pub use providers::{rule_for, validate_provider_id, ProviderRule, PROVIDER_RULES};
pub use validator::{KeyValidator, SecurityReport, SecurityWarning, WarningKind, MIN_KEY_LENGTH};
