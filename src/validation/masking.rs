//! Display-safe derivations of a credential: masked form, prefix marker, digest.

use sha2::{Digest, Sha256};

use super::providers::rule_for;
use crate::secrets::SecretString;

/// Characters kept visible at each end of a long enough key.
const VISIBLE_CHARS: usize = 4;
/// Shortest key that shows any characters at all.
const MIN_REVEALING_LEN: usize = 2 * VISIBLE_CHARS + 1;
/// Cap on the star run so the masked form does not leak the exact length.
const MAX_STARS: usize = 20;

/// First four and last four characters with stars in between.
///
/// Keys shorter than nine characters are fully starred.
pub fn mask_key(key: &SecretString) -> String {
    let chars: Vec<char> = key.expose_secret().chars().collect();
    let len = chars.len();

    if len < MIN_REVEALING_LEN {
        return "*".repeat(len.max(1));
    }

    let stars = (len - 2 * VISIBLE_CHARS).min(MAX_STARS);
    let head: String = chars[..VISIBLE_CHARS].iter().collect();
    let tail: String = chars[len - VISIBLE_CHARS..].iter().collect();
    format!("{}{}{}", head, "*".repeat(stars), tail)
}

/// Provider prefix the key carries, else its first three characters.
pub fn key_prefix(provider: &str, key: &SecretString) -> String {
    let value = key.expose_secret();
    if let Some(prefix) = rule_for(provider).and_then(|rule| rule.expected_prefix) {
        if value.starts_with(prefix) {
            return prefix.to_string();
        }
    }
    value.chars().take(3).collect()
}

/// Hex SHA-256 of the plaintext, for existence checks without decryption.
pub fn key_digest(key: &SecretString) -> String {
    hex::encode(Sha256::digest(key.expose_secret().as_bytes()))
}
