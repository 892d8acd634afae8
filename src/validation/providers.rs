//! Provider credential format rules.
//!
//! Adding a provider is a table entry. A prefix mismatch is a warning only:
//! providers change key formats without notice.

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{GatewayError, Result};

lazy_static! {
    /// Provider identifiers: lowercase, starts with a letter, at most 32 chars
    static ref PROVIDER_ID_REGEX: Regex = Regex::new(r"^[a-z][a-z0-9_-]{1,31}$")
        .expect("PROVIDER_ID_REGEX should be a valid regex pattern");
}

/// Expected shape of one provider's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderRule {
    pub provider: &'static str,
    /// Literal every key from this provider starts with, if any
    pub expected_prefix: Option<&'static str>,
    pub display_name: &'static str,
}

pub const PROVIDER_RULES: &[ProviderRule] = &[
    ProviderRule { provider: "openai", expected_prefix: Some("sk-"), display_name: "OpenAI" },
    ProviderRule { provider: "anthropic", expected_prefix: Some("sk-ant-"), display_name: "Anthropic" },
    ProviderRule { provider: "google", expected_prefix: Some("AIza"), display_name: "Google AI" },
    ProviderRule { provider: "groq", expected_prefix: Some("gsk_"), display_name: "Groq" },
    ProviderRule { provider: "perplexity", expected_prefix: Some("pplx-"), display_name: "Perplexity" },
    ProviderRule { provider: "openrouter", expected_prefix: Some("sk-or-"), display_name: "OpenRouter" },
    ProviderRule { provider: "xai", expected_prefix: Some("xai-"), display_name: "xAI" },
    ProviderRule { provider: "huggingface", expected_prefix: Some("hf_"), display_name: "Hugging Face" },
    ProviderRule { provider: "deepseek", expected_prefix: Some("sk-"), display_name: "DeepSeek" },
    ProviderRule { provider: "mistral", expected_prefix: None, display_name: "Mistral" },
    ProviderRule { provider: "cohere", expected_prefix: None, display_name: "Cohere" },
];

/// Rule for `provider`, if it is a known provider.
pub fn rule_for(provider: &str) -> Option<&'static ProviderRule> {
    PROVIDER_RULES.iter().find(|rule| rule.provider == provider)
}

/// Reject malformed provider identifiers before they reach storage or logs.
pub fn validate_provider_id(provider: &str) -> Result<()> {
    if PROVIDER_ID_REGEX.is_match(provider) {
        Ok(())
    } else {
        Err(GatewayError::validation(format!(
            "invalid provider identifier '{}': expected lowercase letters, digits, '-' or '_'",
            provider
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_providers() {
        assert_eq!(rule_for("anthropic").unwrap().expected_prefix, Some("sk-ant-"));
        assert_eq!(rule_for("google").unwrap().expected_prefix, Some("AIza"));
        assert_eq!(rule_for("mistral").unwrap().expected_prefix, None);
        assert!(rule_for("acme").is_none());
    }

    #[test]
    fn test_provider_ids_are_unique() {
        let mut ids: Vec<_> = PROVIDER_RULES.iter().map(|r| r.provider).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), PROVIDER_RULES.len());
    }

    #[test]
    fn test_validate_provider_id() {
        assert!(validate_provider_id("openai").is_ok());
        assert!(validate_provider_id("my-llm_2").is_ok());
        assert!(validate_provider_id("OpenAI").is_err());
        assert!(validate_provider_id("a").is_err());
        assert!(validate_provider_id("open ai").is_err());
    }
}
