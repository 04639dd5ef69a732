use std::sync::LazyLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::validator::Validator;

static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email regex is valid")
});

/// A registered user account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    /// Argon2id PHC string, never serialized
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    /// Build a new, not yet persisted, inactive user
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            name,
            email,
            password_hash,
            activated: false,
            version: 1,
        }
    }
}

/// The identity attached to a request by the authentication stage
#[derive(Debug, Clone)]
pub enum CurrentUser {
    /// No `Authorization` header was presented
    Anonymous,
    Authenticated(User),
}

impl CurrentUser {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, CurrentUser::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            CurrentUser::Anonymous => None,
            CurrentUser::Authenticated(user) => Some(user),
        }
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(EMAIL_RX.is_match(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

pub fn validate_user(v: &mut Validator, user: &User) {
    v.check(!user.name.is_empty(), "name", "must be provided");
    v.check(user.name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, &user.email);
}

/// Hash a password with Argon2id and a random salt
///
/// CPU heavy: call from `spawn_blocking`.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Check a plaintext password against a stored hash
///
/// CPU heavy: call from `spawn_blocking`.
pub fn password_matches(password_hash: &str, password: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        let mut v = Validator::new();
        validate_email(&mut v, "alice@example.com");
        assert!(v.valid());

        let mut v = Validator::new();
        validate_email(&mut v, "");
        assert_eq!(v.errors()["email"], "must be provided");

        let mut v = Validator::new();
        validate_email(&mut v, "not-an-email");
        assert_eq!(v.errors()["email"], "must be a valid email address");
    }

    #[test]
    fn test_validate_password_plaintext() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "pa55word");
        assert!(v.valid());

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "short");
        assert_eq!(v.errors()["password"], "must be at least 8 bytes long");

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"x".repeat(73));
        assert_eq!(v.errors()["password"], "must not be more than 72 bytes long");
    }

    #[test]
    fn test_validate_user_name() {
        let mut v = Validator::new();
        let user = User::new(String::new(), "bob@example.com".into(), String::new());
        validate_user(&mut v, &user);
        assert_eq!(v.errors()["name"], "must be provided");
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("pa55word").unwrap();

        assert_ne!(hash, "pa55word");
        assert!(password_matches(&hash, "pa55word").unwrap());
        assert!(!password_matches(&hash, "wrong-password").unwrap());
    }

    #[test]
    fn test_current_user() {
        assert!(CurrentUser::Anonymous.is_anonymous());
        assert!(CurrentUser::Anonymous.user().is_none());

        let user = User::new("Alice".into(), "alice@example.com".into(), String::new());
        let current = CurrentUser::Authenticated(user);
        assert!(!current.is_anonymous());
        assert_eq!(current.user().map(|u| u.name.as_str()), Some("Alice"));
    }

    #[test]
    fn test_serialized_user_hides_password() {
        let user = User::new("Alice".into(), "alice@example.com".into(), "secret-hash".into());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["activated"], false);
    }
}
