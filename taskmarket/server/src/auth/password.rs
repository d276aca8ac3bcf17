//! PBKDF2 password hashing.
//!
//! Hashes are stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>` with
//! standard base64 for the binary parts.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const CREDENTIAL_LEN: usize = ring::digest::SHA256_OUTPUT_LEN;

pub const DEFAULT_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(iterations) => iterations,
    None => panic!("iteration count must be non-zero"),
};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to generate a password salt")]
    SaltGeneration,
}

/// Hashes a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_with_iterations(password, DEFAULT_ITERATIONS)
}

fn hash_with_iterations(password: &str, iterations: NonZeroU32) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| PasswordError::SaltGeneration)?;

    let mut credential = [0u8; CREDENTIAL_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &mut credential,
    );

    Ok(format!(
        "{SCHEME}${iterations}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(credential)
    ))
}

/// Checks a password against a stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let mut parts = stored_hash.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(credential), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(credential)) = (STANDARD.decode(salt), STANDARD.decode(credential)) else {
        return false;
    };

    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &credential,
    )
    .is_ok()
}
