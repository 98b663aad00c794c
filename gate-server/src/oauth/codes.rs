//! Single-use authorization codes

use super::pending::PendingAuthorization;
use super::pkce::ChallengeMethod;
use crate::store::{Store, StoreBackend, StoreError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What an authorization code is bound to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub subject_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: ChallengeMethod,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl AuthorizationCode {
    pub fn is_expired(&self) -> bool {
        super::now() >= self.expires_at
    }
}

/// Issues and consumes authorization codes
#[derive(Clone, Debug)]
pub struct AuthorizationCodes {
    store: Store,
    ttl: Duration,
}

impl AuthorizationCodes {
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Mint a code for `subject_id`, bound to the pending request's parameters
    pub async fn issue(
        &self,
        pending: &PendingAuthorization,
        subject_id: &str,
    ) -> Result<String, StoreError> {
        let code = super::random_token(32);
        let issued_at = super::now();
        let record = AuthorizationCode {
            subject_id: subject_id.to_string(),
            client_id: pending.client_id.clone(),
            redirect_uri: pending.redirect_uri.clone(),
            scope: pending.scope.clone(),
            code_challenge: pending.code_challenge.clone(),
            code_challenge_method: pending.code_challenge_method,
            issued_at,
            expires_at: issued_at + self.ttl.as_secs() as i64,
        };
        self.store.set(&code, &record, Some(self.ttl)).await?;
        debug!("Issued authorization code for client '{}'", record.client_id);
        Ok(code)
    }

    /// Remove the code and return its binding if it was still valid.
    ///
    /// The code is gone after this call whatever the caller does next: of any
    /// number of concurrent calls with the same code, at most one gets `Some`.
    pub async fn consume(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        if code.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .take::<AuthorizationCode>(code)
            .await?
            .filter(|record| !record.is_expired()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::pending::tests::sample;
    use crate::store::memory::InMemoryStore;
    use std::sync::Arc;

    fn codes(ttl: u64) -> AuthorizationCodes {
        AuthorizationCodes::new(
            Store::InMemory(InMemoryStore::new(16)),
            Duration::from_secs(ttl),
        )
    }

    #[tokio::test]
    async fn test_issue_and_consume_once() {
        let codes = codes(60);
        let code = codes.issue(&sample(600), "creator-id").await.unwrap();

        let record = codes.consume(&code).await.unwrap().unwrap();
        assert_eq!(record.subject_id, "creator-id");
        assert_eq!(record.client_id, "client");
        assert_eq!(record.redirect_uri, "https://client.example/cb");
        assert_eq!(record.expires_at - record.issued_at, 60);

        assert!(codes.consume(&code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_code() {
        let codes = codes(0);
        let code = codes.issue(&sample(600), "creator-id").await.unwrap();
        assert!(codes.consume(&code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_consume() {
        let codes = Arc::new(codes(60));
        let code = codes.issue(&sample(600), "creator-id").await.unwrap();

        let (a, b) = tokio::join!(
            {
                let codes = codes.clone();
                let code = code.clone();
                async move { codes.consume(&code).await.unwrap() }
            },
            {
                let codes = codes.clone();
                let code = code.clone();
                async move { codes.consume(&code).await.unwrap() }
            }
        );
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let codes = codes(60);
        assert!(codes.consume("nope").await.unwrap().is_none());
        assert!(codes.consume("").await.unwrap().is_none());
    }
}
