//! Signed access tokens with a revocation deny-list

use crate::store::{Store, StoreBackend, StoreError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Format version carried in every token
pub const TOKEN_VERSION: u32 = 1;
const TOKEN_TYPE: &str = "access";

/// Errors that can occur while issuing or validating tokens
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Malformed token: {0}")]
    Malformed(String),
    #[error("Token has been revoked")]
    Revoked,
    #[error("Unsupported token version {0}")]
    UnsupportedVersion(u32),
    #[error("Token signing failed: {0}")]
    Signing(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

/// Claims of an access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    pub client_id: String,
    pub scope: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Token id, the deny-list key
    pub jti: String,
    pub typ: String,
    pub ver: u32,
}

/// A freshly minted token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
    pub scope: String,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and validates access tokens
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<Keys>,
    issuer: String,
    ttl: Duration,
    revoked: Store,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, issuer: &str, ttl: Duration, revoked: Store) -> Self {
        Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            }),
            issuer: issuer.to_string(),
            ttl,
            revoked,
        }
    }

    /// Mint a token for `subject_id` acting through `client_id`
    pub fn issue(
        &self,
        subject_id: &str,
        client_id: &str,
        scope: &str,
    ) -> Result<IssuedToken, TokenError> {
        let iat = super::now();
        let claims = AccessClaims {
            sub: subject_id.to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            iss: self.issuer.clone(),
            iat,
            exp: iat + self.ttl.as_secs() as i64,
            jti: super::random_token(16),
            typ: TOKEN_TYPE.to_string(),
            ver: TOKEN_VERSION,
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        debug!("Issued access token for client '{}'", client_id);
        Ok(IssuedToken {
            access_token,
            expires_in: self.ttl.as_secs(),
            scope: claims.scope,
        })
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Result<AccessClaims, TokenError> {
        let claims = decode::<AccessClaims>(token, &self.keys.decoding, &self.validation(validate_exp))?
            .claims;
        if claims.ver != TOKEN_VERSION {
            return Err(TokenError::UnsupportedVersion(claims.ver));
        }
        if claims.typ != TOKEN_TYPE {
            return Err(TokenError::Malformed(format!("unexpected token type '{}'", claims.typ)));
        }
        Ok(claims)
    }

    /// Verify signature, expiry and revocation. Does not look at who the subject is.
    pub async fn validate(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims = self.decode(token, true)?;
        if self.revoked.get::<bool>(&claims.jti).await?.is_some() {
            return Err(TokenError::Revoked);
        }
        Ok(claims)
    }

    /// Deny-list the token until it would have expired anyway.
    /// Returns false when the token was not one of ours or had already expired.
    pub async fn revoke(&self, token: &str) -> Result<bool, TokenError> {
        let claims = match self.decode(token, false) {
            Ok(claims) => claims,
            Err(TokenError::Store(err)) => return Err(TokenError::Store(err)),
            Err(_) => return Ok(false),
        };

        let remaining = claims.exp - super::now();
        if remaining <= 0 {
            return Ok(false);
        }

        self.revoked
            .set(&claims.jti, &true, Some(Duration::from_secs(remaining as u64)))
            .await?;
        debug!("Revoked access token for client '{}'", claims.client_id);
        Ok(true)
    }
}
