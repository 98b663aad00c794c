//! OAuth 2.1 authorization server: clients, authorization codes, tokens

pub mod codes;
pub mod exchange;
pub mod pending;
pub mod pkce;
pub mod registry;
pub mod session;
pub mod signing_key;
pub mod tokens;

use rand::RngCore;

/// Generate `len` random bytes, encoded as base64url without padding
pub(crate) fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}

/// Current Unix time in seconds
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) mod base64_url {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    pub fn encode(input: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(input)
    }

    pub fn decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
        URL_SAFE_NO_PAD.decode(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_token_length_and_alphabet() {
        let token = random_token(32);
        // 32 bytes -> 43 base64url characters without padding
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_random_token_uniqueness() {
        let tokens: HashSet<String> = (0..100).map(|_| random_token(24)).collect();
        assert_eq!(tokens.len(), 100);
    }
}
