//! In-flight authorization requests, keyed by a server-issued session key

use super::pkce::ChallengeMethod;
use crate::store::{Store, StoreBackend, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The user who signed in during an authorization flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// An authorization request waiting for sign-in and consent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: ChallengeMethod,
    /// The client's `state`, returned unchanged on redirect
    pub state: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
    /// Set once credentials have been verified
    pub user: Option<AuthenticatedUser>,
}

impl PendingAuthorization {
    pub fn is_expired(&self) -> bool {
        super::now() >= self.expires_at
    }

    fn remaining(&self) -> Duration {
        Duration::from_secs((self.expires_at - super::now()).max(0) as u64)
    }
}

/// Shared store of pending authorizations. Any worker may serve any step of a flow.
#[derive(Clone, Debug)]
pub struct PendingAuthorizations {
    store: Store,
    ttl: Duration,
}

impl PendingAuthorizations {
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a pending authorization under a fresh session key
    pub async fn create(&self, pending: &PendingAuthorization) -> Result<String, StoreError> {
        let session_key = super::random_token(32);
        self.store
            .set(&session_key, pending, Some(self.ttl))
            .await?;
        Ok(session_key)
    }

    /// Fetch a live pending authorization
    pub async fn get(&self, session_key: &str) -> Result<Option<PendingAuthorization>, StoreError> {
        if session_key.is_empty() {
            return Ok(None);
        }
        match self.store.get::<PendingAuthorization>(session_key).await? {
            Some(pending) if pending.is_expired() => {
                self.store.delete(session_key).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Record the verified user. The session keeps its original expiry.
    ///
    /// The record is taken and written back, so a session ended by a concurrent
    /// `take` stays ended.
    pub async fn authenticate(
        &self,
        session_key: &str,
        user: AuthenticatedUser,
    ) -> Result<Option<PendingAuthorization>, StoreError> {
        let Some(mut pending) = self.take(session_key).await? else {
            return Ok(None);
        };
        pending.user = Some(user);
        self.store
            .set(session_key, &pending, Some(pending.remaining()))
            .await?;
        Ok(Some(pending))
    }

    /// Remove and return a live pending authorization. Only one caller wins.
    pub async fn take(&self, session_key: &str) -> Result<Option<PendingAuthorization>, StoreError> {
        if session_key.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .take::<PendingAuthorization>(session_key)
            .await?
            .filter(|pending| !pending.is_expired()))
    }
}
