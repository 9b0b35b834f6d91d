use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::CryptoError;

/// 32 bytes = 256 bits of entropy per token.
pub const TOKEN_BYTES: usize = 32;

/// Generate a fresh bearer token secret, URL-safe base64 without padding.
pub fn generate_token() -> Result<String, CryptoError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Rng(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Deterministic one-way digest of a token secret, hex encoded.
/// This is the only form in which a token is ever stored.
pub fn hash_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_full_length() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert_ne!(a, b);

        let decoded = URL_SAFE_NO_PAD.decode(&a).unwrap();
        assert_eq!(decoded.len(), TOKEN_BYTES);
    }

    #[test]
    fn hash_is_deterministic_and_differs_from_secret() {
        let token = generate_token().unwrap();
        let h1 = hash_token(&token);
        let h2 = hash_token(&token);
        assert_eq!(h1, h2);
        assert_ne!(h1, token);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn different_secrets_hash_differently() {
        assert_ne!(hash_token("a"), hash_token("b"));
    }
}
