//! Chatter crypto helpers
//!
//! - Opaque bearer tokens: 256-bit random secrets, stored only as SHA-256 digests.
//! - Password hashing with Argon2id.

pub mod password;
pub mod token;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("random number generator failure: {0}")]
    Rng(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}
