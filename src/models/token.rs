use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use rand::seq::IndexedRandom;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::validation::{TOKEN_ALPHABET, TOKEN_PLAINTEXT_LENGTH};

/// Purpose tag restricting what a bearer token may be exchanged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenScope {
    Authentication,
    Activation,
    PasswordReset,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Authentication => "authentication",
            TokenScope::Activation => "activation",
            TokenScope::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issued token.
///
/// Only `hash` is meant to be persisted; `plaintext` is handed to the client
/// once and is skipped by `Debug` so it cannot end up in logs.
#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: [u8; 32],
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: TokenScope,
}

impl Token {
    /// Generate a fresh random token for `user_id` valid for `ttl`.
    pub fn generate(user_id: i64, ttl: TimeDelta, scope: TokenScope) -> Self {
        let mut rng = rand::rng();
        let plaintext: String = (0..TOKEN_PLAINTEXT_LENGTH)
            .filter_map(|_| TOKEN_ALPHABET.choose(&mut rng).map(|b| char::from(*b)))
            .collect();

        Self::from_plaintext(plaintext, user_id, ttl, scope)
    }

    /// Wrap an already-issued plaintext (e.g. one supplied by an operator).
    pub fn from_plaintext(plaintext: String, user_id: i64, ttl: TimeDelta, scope: TokenScope) -> Self {
        let expiry = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            hash: hash_plaintext(&plaintext),
            plaintext,
            user_id,
            expiry,
            scope,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

/// SHA-256 of a token plaintext, the form tokens are stored and looked up by.
pub fn hash_plaintext(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::validation::validate_token_plaintext;

    #[test]
    fn test_generated_token_is_structurally_valid() {
        for _ in 0..50 {
            let token = Token::generate(1, TimeDelta::hours(24), TokenScope::Authentication);
            assert_eq!(token.plaintext.len(), TOKEN_PLAINTEXT_LENGTH);
            assert!(validate_token_plaintext(&token.plaintext).is_ok());
        }
    }

    #[test]
    fn test_generated_tokens_differ() {
        let a = Token::generate(1, TimeDelta::hours(1), TokenScope::Activation);
        let b = Token::generate(1, TimeDelta::hours(1), TokenScope::Activation);
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_matches_plaintext() {
        let token = Token::generate(3, TimeDelta::minutes(5), TokenScope::PasswordReset);
        assert_eq!(token.hash, hash_plaintext(&token.plaintext));
        assert!(token.expiry > Utc::now());
    }

    #[test]
    fn test_debug_redacts_plaintext() {
        let token = Token::generate(1, TimeDelta::hours(1), TokenScope::Authentication);
        let debug = format!("{token:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&token.plaintext));
    }

    #[test]
    fn test_scope_strings() {
        assert_eq!(TokenScope::Authentication.as_str(), "authentication");
        assert_eq!(TokenScope::Activation.to_string(), "activation");
        assert_eq!(
            serde_json::to_value(TokenScope::PasswordReset).unwrap(),
            "password-reset"
        );
    }
}
