use chrono::{DateTime, Duration, SubsecRound, Utc};
use data_encoding::BASE32_NOPAD;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::validator::Validator;

/// Number of random bytes behind every token
pub const TOKEN_BYTES: usize = 16;

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
    PasswordReset,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
            Scope::PasswordReset => "password-reset",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly issued token
///
/// `plaintext` is handed to the client exactly once. Only `hash` is
/// persisted, so the plaintext can never be recovered from storage.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: [u8; 32],
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    /// Generate a random token for `user_id` that expires `ttl` from now
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> Self {
        let bytes: [u8; TOKEN_BYTES] = rand::rng().random();
        let plaintext = BASE32_NOPAD.encode(&bytes);
        let hash = hash_token(&plaintext);

        Self {
            plaintext,
            hash,
            user_id,
            // Microseconds, matching what timestamptz stores
            expiry: (Utc::now() + ttl).trunc_subsecs(6),
            scope,
        }
    }
}

/// SHA-256 of the token plaintext, as stored and looked up
pub fn hash_token(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Check that a presented token has the shape of one we issued
///
/// Rejects anything that does not decode to exactly [`TOKEN_BYTES`] bytes,
/// so malformed tokens never cost a storage round trip.
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    let decoded_len = BASE32_NOPAD
        .decode(plaintext.as_bytes())
        .map(|bytes| bytes.len())
        .unwrap_or(0);
    v.check(decoded_len == TOKEN_BYTES, "token", "must be 26 bytes long");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let token = Token::generate(42, Duration::hours(1), Scope::Authentication);

        assert_eq!(token.plaintext.len(), 26);
        assert_eq!(token.hash, hash_token(&token.plaintext));
        assert_eq!(token.user_id, 42);
        assert!(token.expiry > Utc::now());
    }

    #[test]
    fn test_expiry_has_storage_precision() {
        let token = Token::generate(1, Duration::zero(), Scope::Authentication);
        assert_eq!(token.expiry.timestamp_subsec_nanos() % 1_000, 0);
        assert!(token.expiry <= Utc::now());
    }

    #[test]
    fn test_generated_tokens_differ() {
        let a = Token::generate(1, Duration::hours(1), Scope::Activation);
        let b = Token::generate(1, Duration::hours(1), Scope::Activation);
        assert_ne!(a.plaintext, b.plaintext);
    }

    #[test]
    fn test_validate_token_plaintext() {
        let token = Token::generate(1, Duration::hours(1), Scope::Authentication);
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, &token.plaintext);
        assert!(v.valid());

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "");
        assert_eq!(v.errors()["token"], "must be provided");

        // Right length, but not base-32
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "abcdefghijklmnopqrstuvwxyz");
        assert!(!v.valid());

        // Valid base-32, wrong size
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "MZXW6YTBOI");
        assert!(!v.valid());
    }

    #[test]
    fn test_serialized_token_hides_hash() {
        let token = Token::generate(7, Duration::hours(24), Scope::Authentication);
        let json = serde_json::to_value(&token).unwrap();

        assert_eq!(json["token"], token.plaintext);
        assert!(json.get("hash").is_none());
        assert!(json.get("user_id").is_none());
        assert!(json.get("expiry").is_some());
    }
}
