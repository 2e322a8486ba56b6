use std::sync::Arc;

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

/// How secrets are stored in the `login` collection and compared at login.
pub trait PasswordScheme: Send + Sync {
    fn name(&self) -> &'static str;

    /// Value to persist for a freshly registered secret.
    fn seal(&self, secret: &str) -> Result<String>;

    /// Whether `submitted` matches the persisted value.
    fn matches(&self, stored: &str, submitted: &str) -> bool;
}

/// Secrets stored and compared as-is, byte for byte.
///
/// Insecure: anyone who can read the `login` collection reads every password.
/// Kept as the default so existing credential data keeps working.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextScheme;

impl PasswordScheme for PlaintextScheme {
    fn name(&self) -> &'static str { "plain" }

    fn seal(&self, secret: &str) -> Result<String> { Ok(secret.to_string()) }

    fn matches(&self, stored: &str, submitted: &str) -> bool {
        stored.as_bytes() == submitted.as_bytes()
    }
}

/// Argon2id PHC strings with a random 16-byte salt.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Scheme;

impl PasswordScheme for Argon2Scheme {
    fn name(&self) -> &'static str { "argon2" }

    fn seal(&self, secret: &str) -> Result<String> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let argon2 = Argon2::default();
        let phc = argon2.hash_password(secret.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
        Ok(phc)
    }

    fn matches(&self, stored: &str, submitted: &str) -> bool {
        if let Ok(parsed) = PasswordHash::new(stored) {
            Argon2::default().verify_password(submitted.as_bytes(), &parsed).is_ok()
        } else { false }
    }
}

/// Resolve a scheme by its configuration name (`plain` or `argon2`, case-insensitive).
pub fn scheme_from_name(name: &str) -> Option<Arc<dyn PasswordScheme>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "plain" | "plaintext" => Some(Arc::new(PlaintextScheme)),
        "argon2" | "argon2id" => Some(Arc::new(Argon2Scheme)),
        _ => None,
    }
}
