//! External identity capabilities: credential verification, login views and
//! the creator identity

use crate::config::{GateConfig, IdentityBackend};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod creator;
pub mod http_verifier;
pub mod static_verifier;
pub mod views;

pub use creator::CreatorIdentity;

/// A user whose credentials were accepted
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Reasons a verification can fail. Only operators see the difference; users
/// get one generic message.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Verification method not supported by this backend")]
    Unsupported,
    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
    #[error("Identity service did not answer in time")]
    Timeout,
}

/// "Verify credentials, get a user id"
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify an email and password
    async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<VerifiedUser, VerificationError>;

    /// Verify a session token handed over by the identity service's own login page
    async fn verify_session_token(&self, token: &str) -> Result<VerifiedUser, VerificationError>;
}

/// Creates the verifier selected by the configuration
pub fn create_verifier(config: &GateConfig) -> Result<Arc<dyn CredentialVerifier>, String> {
    match config.identity.backend {
        IdentityBackend::Static => {
            let users = config.identity.get_static_users()?;
            if users.is_empty() {
                log::warn!("Static identity backend has no users; nobody can sign in");
            }
            Ok(Arc::new(static_verifier::StaticVerifier::new(users)))
        }
        IdentityBackend::Http => {
            let verifier = http_verifier::HttpVerifier::new(&config.identity)?;
            Ok(Arc::new(verifier))
        }
    }
}
