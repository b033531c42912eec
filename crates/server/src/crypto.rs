//! Crypto primitives: password and client-secret hashing, token
//! fingerprints, and random token generation.
//!
//! Argon2id (PHC strings) is used for everything a human or a client might
//! present as a secret; SHA-256 fingerprints are the lookup keys for
//! server-generated tokens so raw token values are never at rest.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hash a password (or client secret) using Argon2id.
///
/// Returns the PHC-formatted hash string suitable for storage; the salt and
/// cost parameters are embedded in the string, so verification needs no
/// extra configuration.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password (or client secret) against a stored PHC hash.
///
/// Malformed hashes verify as false rather than erroring; a row with a
/// corrupt hash is indistinguishable from a wrong password to the caller.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// SHA-256 fingerprint of a token, lowercase hex (64 chars).
///
/// Every token lookup key in the database is a fingerprint, never the raw
/// value.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Generate a 32-byte random token, URL-safe base64 without padding
/// (43 chars). Used for authorization codes, refresh tokens, and session
/// tokens.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).expect("OS random source unavailable");
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Constant-time equality for credential material (PKCE results,
/// fingerprints).
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_password() {
        let password = "my-secure-password-123!";
        let hash = hash_password(password).expect("hash password");

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(password, &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn hash_produces_different_salts() {
        let hash1 = hash_password("same-password").expect("hash");
        let hash2 = hash_password("same-password").expect("hash");

        assert_ne!(hash1, hash2);
        assert!(verify_password("same-password", &hash1));
        assert!(verify_password("same-password", &hash2));
    }

    #[test]
    fn verify_invalid_hash_format() {
        assert!(!verify_password("password", "not-a-valid-hash"));
        assert!(!verify_password("password", ""));
        assert!(!verify_password("password", "$invalid$hash$format"));
    }

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let fp = token_fingerprint("abc");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, token_fingerprint("abc"));
        assert_ne!(fp, token_fingerprint("abd"));
        // Known SHA-256 of "abc".
        assert_eq!(
            fp,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let token1 = generate_token();
        let token2 = generate_token();

        assert_ne!(token1, token2);
        assert_eq!(token1.len(), 43);
        assert!(
            token1
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn constant_time_eq_semantics() {
        assert!(constant_time_eq("same", "same"));
        assert!(!constant_time_eq("same", "diff"));
        assert!(!constant_time_eq("short", "longer-value"));
    }
}
