//! Authorization code to access token exchange (RFC 6749 section 4.1.3)

use super::codes::AuthorizationCodes;
use super::registry::ClientRegistry;
use super::tokens::{IssuedToken, TokenError, TokenService};
use crate::store::StoreError;
use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Token request form
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// Must be "authorization_code"
    pub grant_type: Option<String>,
    /// The authorization code
    pub code: Option<String>,
    /// Must equal the redirect URI of the authorization request
    pub redirect_uri: Option<String>,
    /// Client identifier
    pub client_id: Option<String>,
    /// Client secret, for clients registered with client_secret_post
    pub client_secret: Option<String>,
    /// PKCE code verifier
    pub code_verifier: Option<String>,
}

/// Errors of the code exchange
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Unsupported grant type")]
    UnsupportedGrantType,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Client authentication failed")]
    InvalidClient,
    #[error("{0}")]
    InvalidGrant(&'static str),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Token error: {0}")]
    Token(#[from] TokenError),
}

/// Consumes authorization codes exactly once and mints tokens
#[derive(Clone, Debug)]
pub struct CodeExchangeService {
    clients: ClientRegistry,
    codes: AuthorizationCodes,
    tokens: TokenService,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ExchangeError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ExchangeError::InvalidRequest(format!("{name} is required")))
}

impl CodeExchangeService {
    pub fn new(clients: ClientRegistry, codes: AuthorizationCodes, tokens: TokenService) -> Self {
        Self {
            clients,
            codes,
            tokens,
        }
    }

    pub async fn exchange(&self, request: &TokenRequest) -> Result<IssuedToken, ExchangeError> {
        match request.grant_type.as_deref() {
            Some("authorization_code") => {}
            None | Some("") => {
                return Err(ExchangeError::InvalidRequest(
                    "grant_type is required".to_string(),
                ))
            }
            Some(_) => return Err(ExchangeError::UnsupportedGrantType),
        }

        let code = required(&request.code, "code")?;
        let redirect_uri = required(&request.redirect_uri, "redirect_uri")?;
        let client_id = required(&request.client_id, "client_id")?;
        let code_verifier = required(&request.code_verifier, "code_verifier")?;

        let client = self
            .clients
            .lookup(client_id)
            .await?
            .ok_or(ExchangeError::InvalidClient)?;
        if !client.authenticate(request.client_secret.as_deref()) {
            warn!("Client '{}' failed authentication at the token endpoint", client_id);
            return Err(ExchangeError::InvalidClient);
        }

        // Consumed before any check: a failed attempt burns the code too
        let Some(bound) = self.codes.consume(code).await? else {
            warn!("Rejected unknown, expired or reused code for client '{}'", client_id);
            return Err(ExchangeError::InvalidGrant(
                "Authorization code is invalid, expired or already used",
            ));
        };

        if bound.client_id != client_id {
            warn!("Code presented by client '{}' was issued to another client", client_id);
            return Err(ExchangeError::InvalidGrant(
                "Authorization code was issued to another client",
            ));
        }
        if bound.redirect_uri != redirect_uri {
            return Err(ExchangeError::InvalidGrant("redirect_uri does not match"));
        }
        if !bound
            .code_challenge_method
            .verify(&bound.code_challenge, code_verifier)
        {
            warn!("PKCE verification failed for client '{}'", client_id);
            return Err(ExchangeError::InvalidGrant(
                "code_verifier does not match code_challenge",
            ));
        }

        let token = self
            .tokens
            .issue(&bound.subject_id, &bound.client_id, &bound.scope)?;
        info!(
            "Issued access token to client '{}' for user '{}'",
            bound.client_id, bound.subject_id
        );
        Ok(token)
    }
}
