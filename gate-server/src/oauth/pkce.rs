//! Proof Key for Code Exchange (RFC 7636)

use super::base64_url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Transformation applied to the code verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeMethod {
    #[serde(rename = "S256")]
    S256,
    #[serde(rename = "plain")]
    Plain,
}

impl ChallengeMethod {
    /// Parses a `code_challenge_method`; `plain` is only accepted when allowed
    pub fn parse(method: &str, allow_plain: bool) -> Option<Self> {
        match method {
            "S256" => Some(Self::S256),
            "plain" if allow_plain => Some(Self::Plain),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }

    /// Derive the challenge for `verifier`
    pub fn challenge(&self, verifier: &str) -> String {
        match self {
            Self::S256 => {
                let digest = Sha256::digest(verifier.as_bytes());
                base64_url::encode(&digest)
            }
            Self::Plain => verifier.to_string(),
        }
    }

    /// Check `verifier` against the stored `challenge` in constant time
    pub fn verify(&self, challenge: &str, verifier: &str) -> bool {
        let expected = self.challenge(verifier);
        expected.as_bytes().ct_eq(challenge.as_bytes()).into()
    }
}

/// Methods advertised in discovery metadata
pub fn supported_methods(allow_plain: bool) -> Vec<&'static str> {
    if allow_plain {
        vec!["S256", "plain"]
    } else {
        vec!["S256"]
    }
}
