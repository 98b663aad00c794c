//! The interactive part of the authorization code flow: validate the request,
//! verify credentials, check the creator, ask for consent, issue the code

use super::codes::AuthorizationCodes;
use super::pending::{AuthenticatedUser, PendingAuthorization, PendingAuthorizations};
use super::pkce::ChallengeMethod;
use super::registry::ClientRegistry;
use crate::identity::{CreatorIdentity, CredentialVerifier, VerificationError, VerifiedUser};
use crate::store::StoreError;
use log::{info, warn};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use utoipa::IntoParams;

/// Shown for every failed sign-in, whatever the reason
pub const GENERIC_LOGIN_ERROR: &str = "Sign-in failed. Check your email and password and try again.";
const CREATOR_ONLY: &str = "Only the creator of this server can authorize clients";

/// Authorization request query (RFC 6749 section 4.1.1 with RFC 7636)
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizationRequest {
    /// Must be "code"
    pub response_type: Option<String>,
    /// Registered client identifier
    pub client_id: Option<String>,
    /// One of the client's registered redirect URIs
    pub redirect_uri: Option<String>,
    /// Space-separated scopes
    pub scope: Option<String>,
    /// Opaque value returned unchanged to the client
    pub state: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE method, "S256"
    pub code_challenge_method: Option<String>,
}

/// Errors of the authorization flow
#[derive(Debug, Error)]
pub enum AuthorizeError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Only 'code' response type is supported")]
    UnsupportedResponseType,
    #[error("Unsupported scope '{0}'")]
    InvalidScope(String),
    #[error("Authorization session not found or expired")]
    SessionNotFound,
    #[error("Authorization session has not signed in yet")]
    NotAuthenticated,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What to do after a sign-in attempt
#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials accepted, ask for consent
    Consent(PendingAuthorization),
    /// Show the form again with this message
    Retry(&'static str),
    /// The flow is over; send the user agent to this URL
    Redirect(String),
}

/// Orchestrates `/authorize`, sign-in and consent
#[derive(Clone)]
pub struct AuthorizationSessionManager {
    clients: ClientRegistry,
    pending: PendingAuthorizations,
    codes: AuthorizationCodes,
    verifier: Arc<dyn CredentialVerifier>,
    creator: CreatorIdentity,
    verify_timeout: Duration,
    default_scope: String,
    supported_scopes: Vec<String>,
    allow_plain_pkce: bool,
}

/// Settings of the session manager taken from the configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub verify_timeout: Duration,
    pub default_scope: String,
    pub supported_scopes: Vec<String>,
    pub allow_plain_pkce: bool,
}

impl AuthorizationSessionManager {
    pub fn new(
        clients: ClientRegistry,
        pending: PendingAuthorizations,
        codes: AuthorizationCodes,
        verifier: Arc<dyn CredentialVerifier>,
        creator: CreatorIdentity,
        settings: SessionSettings,
    ) -> Self {
        Self {
            clients,
            pending,
            codes,
            verifier,
            creator,
            verify_timeout: settings.verify_timeout,
            default_scope: settings.default_scope,
            supported_scopes: settings.supported_scopes,
            allow_plain_pkce: settings.allow_plain_pkce,
        }
    }

    /// Validate an authorization request and park it under a new session key.
    ///
    /// The client and redirect URI are checked before anything else, so an
    /// error here never leads to a redirect.
    pub async fn begin(&self, request: &AuthorizationRequest) -> Result<String, AuthorizeError> {
        let client_id = non_empty(&request.client_id)
            .ok_or_else(|| AuthorizeError::InvalidRequest("client_id is required".to_string()))?;
        let client = self
            .clients
            .lookup(client_id)
            .await?
            .ok_or_else(|| AuthorizeError::InvalidRequest("Unknown client_id".to_string()))?;

        let redirect_uri = non_empty(&request.redirect_uri)
            .ok_or_else(|| AuthorizeError::InvalidRequest("redirect_uri is required".to_string()))?;
        if !client.allows_redirect(redirect_uri) {
            return Err(AuthorizeError::InvalidRequest(
                "redirect_uri is not registered for this client".to_string(),
            ));
        }

        match request.response_type.as_deref() {
            Some("code") => {}
            None | Some("") => {
                return Err(AuthorizeError::InvalidRequest(
                    "response_type is required".to_string(),
                ))
            }
            Some(_) => return Err(AuthorizeError::UnsupportedResponseType),
        }

        let code_challenge = non_empty(&request.code_challenge).ok_or_else(|| {
            AuthorizeError::InvalidRequest("code_challenge is required (PKCE)".to_string())
        })?;
        let method = non_empty(&request.code_challenge_method).ok_or_else(|| {
            AuthorizeError::InvalidRequest("code_challenge_method is required (PKCE)".to_string())
        })?;
        let method = ChallengeMethod::parse(method, self.allow_plain_pkce).ok_or_else(|| {
            AuthorizeError::InvalidRequest(format!("Unsupported code_challenge_method '{method}'"))
        })?;

        let scope = self.resolve_scope(request.scope.as_deref())?;

        let now = super::now();
        let pending = PendingAuthorization {
            client_id: client.client_id.clone(),
            client_name: client.client_name.clone(),
            redirect_uri: redirect_uri.to_string(),
            scope,
            code_challenge: code_challenge.to_string(),
            code_challenge_method: method,
            state: request.state.clone(),
            created_at: now,
            expires_at: now + self.pending.ttl().as_secs() as i64,
            user: None,
        };
        let session_key = self.pending.create(&pending).await?;
        info!("Started authorization for client '{}'", client.client_id);
        Ok(session_key)
    }

    fn resolve_scope(&self, requested: Option<&str>) -> Result<String, AuthorizeError> {
        let requested: Vec<&str> = requested
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        if requested.is_empty() {
            return Ok(self.default_scope.clone());
        }
        if let Some(unknown) = requested
            .iter()
            .find(|scope| !self.supported_scopes.iter().any(|s| s == *scope))
        {
            return Err(AuthorizeError::InvalidScope(unknown.to_string()));
        }
        Ok(requested.join(" "))
    }

    /// A live pending authorization
    pub async fn pending(&self, session_key: &str) -> Result<PendingAuthorization, AuthorizeError> {
        self.pending
            .get(session_key)
            .await?
            .ok_or(AuthorizeError::SessionNotFound)
    }

    /// Sign in with email and password
    pub async fn login(
        &self,
        session_key: &str,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, AuthorizeError> {
        self.pending(session_key).await?;
        let result = self
            .verify(self.verifier.verify_password(email, password))
            .await;
        self.complete_login(session_key, result).await
    }

    /// Sign in with a session token delivered in a request body by the identity
    /// service's own login page
    pub async fn bridge(
        &self,
        session_key: &str,
        access_token: &str,
    ) -> Result<LoginOutcome, AuthorizeError> {
        self.pending(session_key).await?;
        let result = self
            .verify(self.verifier.verify_session_token(access_token))
            .await;
        self.complete_login(session_key, result).await
    }

    /// Runs a verification with the configured deadline. No store is touched
    /// while it is in flight and it is never retried.
    async fn verify<F>(&self, verification: F) -> Result<VerifiedUser, VerificationError>
    where
        F: Future<Output = Result<VerifiedUser, VerificationError>>,
    {
        match tokio::time::timeout(self.verify_timeout, verification).await {
            Ok(result) => result,
            Err(_) => Err(VerificationError::Timeout),
        }
    }

    async fn complete_login(
        &self,
        session_key: &str,
        result: Result<VerifiedUser, VerificationError>,
    ) -> Result<LoginOutcome, AuthorizeError> {
        let user = match result {
            Ok(user) => user,
            Err(err) => {
                warn!("Sign-in failed: {}", err);
                return Ok(LoginOutcome::Retry(GENERIC_LOGIN_ERROR));
            }
        };

        if !self.creator.permits(&user.user_id).await {
            warn!("Refused authorization for non-creator user '{}'", user.user_id);
            let pending = self
                .pending
                .take(session_key)
                .await?
                .ok_or(AuthorizeError::SessionNotFound)?;
            return Ok(LoginOutcome::Redirect(error_redirect(&pending, CREATOR_ONLY)?));
        }

        info!("User '{}' signed in", user.user_id);
        let pending = self
            .pending
            .authenticate(
                session_key,
                AuthenticatedUser {
                    user_id: user.user_id,
                    email: user.email,
                },
            )
            .await?
            .ok_or(AuthorizeError::SessionNotFound)?;
        Ok(LoginOutcome::Consent(pending))
    }

    /// Record the consent decision. Returns the URL to send the user agent to:
    /// the client's redirect URI with either a code or `error=access_denied`,
    /// and the client's `state` in both cases.
    pub async fn decide(&self, session_key: &str, approve: bool) -> Result<String, AuthorizeError> {
        if self.pending(session_key).await?.user.is_none() {
            return Err(AuthorizeError::NotAuthenticated);
        }

        // Taking the record makes a double submit issue at most one code
        let pending = self
            .pending
            .take(session_key)
            .await?
            .ok_or(AuthorizeError::SessionNotFound)?;
        let Some(user) = pending.user.clone() else {
            return Err(AuthorizeError::NotAuthenticated);
        };

        if !approve {
            info!("User '{}' denied client '{}'", user.user_id, pending.client_id);
            return error_redirect(&pending, "User denied access");
        }

        // The creator may have changed since sign-in
        if !self.creator.permits(&user.user_id).await {
            warn!("Refused authorization for non-creator user '{}'", user.user_id);
            return error_redirect(&pending, CREATOR_ONLY);
        }

        let code = self.codes.issue(&pending, &user.user_id).await?;
        info!(
            "User '{}' authorized client '{}'",
            user.user_id, pending.client_id
        );
        redirect_to_client(&pending, &[("code", &code)])
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// The client's redirect URI with `params` and the original `state` appended
pub fn redirect_to_client(
    pending: &PendingAuthorization,
    params: &[(&str, &str)],
) -> Result<String, AuthorizeError> {
    let mut url = Url::parse(&pending.redirect_uri)
        .map_err(|_| AuthorizeError::InvalidRequest("Invalid redirect_uri".to_string()))?;
    {
        let mut query = url.query_pairs_mut();
        for (name, value) in params {
            query.append_pair(name, value);
        }
        if let Some(state) = &pending.state {
            query.append_pair("state", state);
        }
    }
    Ok(url.into())
}

fn error_redirect(pending: &PendingAuthorization, description: &str) -> Result<String, AuthorizeError> {
    redirect_to_client(
        pending,
        &[("error", "access_denied"), ("error_description", description)],
    )
}
