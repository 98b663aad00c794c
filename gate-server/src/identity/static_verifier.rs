use super::{CredentialVerifier, VerificationError, VerifiedUser};
use crate::config::identity::StaticUser;
use async_trait::async_trait;
use subtle::ConstantTimeEq;

/// Verifies against users listed in the configuration
#[derive(Debug, Clone)]
pub struct StaticVerifier {
    users: Vec<StaticUser>,
}

impl StaticVerifier {
    pub fn new(users: Vec<StaticUser>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl CredentialVerifier for StaticVerifier {
    async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<VerifiedUser, VerificationError> {
        let user = self
            .users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email.trim()))
            .ok_or(VerificationError::InvalidCredentials)?;

        if !bool::from(user.password.as_bytes().ct_eq(password.as_bytes())) {
            return Err(VerificationError::InvalidCredentials);
        }

        Ok(VerifiedUser {
            user_id: user.user_id.clone(),
            email: Some(user.email.clone()),
        })
    }

    async fn verify_session_token(&self, _token: &str) -> Result<VerifiedUser, VerificationError> {
        Err(VerificationError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> StaticVerifier {
        StaticVerifier::new(vec![StaticUser {
            email: "creator@example.com".to_string(),
            password: "creator-pw".to_string(),
            user_id: "creator-id".to_string(),
        }])
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let user = verifier()
            .verify_password("Creator@Example.com", "creator-pw")
            .await
            .unwrap();
        assert_eq!(user.user_id, "creator-id");
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_alike() {
        let verifier = verifier();
        let wrong_password = verifier
            .verify_password("creator@example.com", "nope")
            .await
            .unwrap_err();
        let unknown_user = verifier
            .verify_password("someone@example.com", "creator-pw")
            .await
            .unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_session_tokens_unsupported() {
        assert!(matches!(
            verifier().verify_session_token("token").await,
            Err(VerificationError::Unsupported)
        ));
    }
}
