//! Verifier backed by a GoTrue-compatible identity service

use super::{CredentialVerifier, VerificationError, VerifiedUser};
use crate::config::IdentityConfig;
use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct IdentityUser {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PasswordGrantResponse {
    user: IdentityUser,
}

/// Calls the identity service over HTTP. No retries: a failure reaches the
/// person at the login form right away.
#[derive(Clone, Debug)]
pub struct HttpVerifier {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpVerifier {
    pub fn new(config: &IdentityConfig) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .connect_timeout(Duration::from_secs(config.timeout.min(5)))
            .build()
            .map_err(|e| format!("Failed to create identity HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn read_user(response: reqwest::Response) -> Result<IdentityUser, VerificationError> {
        response
            .json::<IdentityUser>()
            .await
            .map_err(|e| VerificationError::Unavailable(format!("Unexpected response body: {e}")))
    }

    fn classify(status: StatusCode) -> VerificationError {
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                VerificationError::InvalidCredentials
            }
            status => {
                error!("Identity service answered with HTTP {}", status);
                VerificationError::Unavailable(format!("HTTP {status}"))
            }
        }
    }

    fn transport_error(err: reqwest::Error) -> VerificationError {
        if err.is_timeout() {
            VerificationError::Timeout
        } else {
            VerificationError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl CredentialVerifier for HttpVerifier {
    async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<VerifiedUser, VerificationError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        debug!("Verifying password credentials with the identity service");

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::classify(response.status()));
        }

        let grant = response
            .json::<PasswordGrantResponse>()
            .await
            .map_err(|e| VerificationError::Unavailable(format!("Unexpected response body: {e}")))?;

        Ok(VerifiedUser {
            user_id: grant.user.id,
            email: grant.user.email,
        })
    }

    async fn verify_session_token(&self, token: &str) -> Result<VerifiedUser, VerificationError> {
        if token.is_empty() {
            return Err(VerificationError::InvalidCredentials);
        }
        let url = format!("{}/auth/v1/user", self.base_url);
        debug!("Verifying session token with the identity service");

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::classify(response.status()));
        }

        let user = Self::read_user(response).await?;
        Ok(VerifiedUser {
            user_id: user.id,
            email: user.email,
        })
    }
}
