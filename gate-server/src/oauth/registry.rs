//! Dynamic client registration (RFC 7591)

use crate::store::{Store, StoreBackend, StoreError};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

const DEFAULT_CLIENT_NAME: &str = "MCP Client";
const AUTHORIZATION_CODE: &str = "authorization_code";
const DEFAULT_MAX_CLIENTS: usize = 10_000;

/// Errors that can occur while registering a client
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("redirect_uris is required and must not be empty")]
    MissingRedirectUris,
    #[error("Invalid redirect URI '{0}'")]
    InvalidRedirectUri(String),
    #[error("The authorization_code grant type is required")]
    UnsupportedGrantTypes,
    #[error("The 'code' response type is required")]
    UnsupportedResponseTypes,
    #[error("Unsupported token_endpoint_auth_method '{0}'")]
    UnsupportedAuthMethod(String),
    #[error("No more than {0} clients may register")]
    TooManyClients(usize),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// How a client authenticates at the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// Public client, protected by PKCE alone
    None,
    /// Confidential client sending `client_secret` in the form body
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    fn parse(method: &str) -> Option<Self> {
        match method {
            "none" => Some(Self::None),
            "client_secret_post" => Some(Self::ClientSecretPost),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

/// Client metadata submitted for registration
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ClientMetadata {
    /// Redirect URIs the client may use; at least one is required
    pub redirect_uris: Option<Vec<String>>,
    /// Human-readable client name
    pub client_name: Option<String>,
    /// Grant types the client will use
    pub grant_types: Option<Vec<String>>,
    /// Response types the client will use
    pub response_types: Option<Vec<String>>,
    /// Token endpoint authentication method ("none" or "client_secret_post")
    pub token_endpoint_auth_method: Option<String>,
}

/// A registered OAuth client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    pub created_at: i64,
}

impl RegisteredClient {
    /// Exact string match against the registered redirect URIs
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    /// Checks the secret presented at the token endpoint. Public clients need none.
    pub fn authenticate(&self, presented: Option<&str>) -> bool {
        match (&self.client_secret, presented) {
            (None, _) => true,
            (Some(expected), Some(presented)) => {
                expected.as_bytes().ct_eq(presented.as_bytes()).into()
            }
            (Some(_), None) => false,
        }
    }
}

/// Storage of registered clients.
///
/// Registration is unauthenticated, so the number of clients registered by this
/// process is capped. Clients are never evicted once stored.
#[derive(Clone, Debug)]
pub struct ClientRegistry {
    store: Store,
    max_clients: usize,
    registered: Arc<AtomicUsize>,
}

impl ClientRegistry {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            max_clients: DEFAULT_MAX_CLIENTS,
            registered: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    fn reserve_slot(&self) -> Result<(), RegistrationError> {
        self.registered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.max_clients).then_some(count + 1)
            })
            .map(|_| ())
            .map_err(|_| RegistrationError::TooManyClients(self.max_clients))
    }

    /// Register a new client. Every call creates a distinct client.
    pub async fn register(
        &self,
        metadata: ClientMetadata,
    ) -> Result<RegisteredClient, RegistrationError> {
        let redirect_uris = metadata.redirect_uris.unwrap_or_default();
        if redirect_uris.is_empty() {
            return Err(RegistrationError::MissingRedirectUris);
        }
        for uri in &redirect_uris {
            validate_redirect_uri(uri)?;
        }

        // Clients commonly ask for refresh_token too; only the code grant is issued
        let grant_types = match metadata.grant_types {
            Some(types) if !types.iter().any(|t| t == AUTHORIZATION_CODE) => {
                return Err(RegistrationError::UnsupportedGrantTypes);
            }
            _ => vec![AUTHORIZATION_CODE.to_string()],
        };

        let response_types = match metadata.response_types {
            Some(types) if !types.iter().any(|t| t == "code") => {
                return Err(RegistrationError::UnsupportedResponseTypes);
            }
            _ => vec!["code".to_string()],
        };

        let auth_method = match metadata.token_endpoint_auth_method.as_deref() {
            None => TokenEndpointAuthMethod::None,
            Some(method) => TokenEndpointAuthMethod::parse(method)
                .ok_or_else(|| RegistrationError::UnsupportedAuthMethod(method.to_string()))?,
        };

        let client_secret = match auth_method {
            TokenEndpointAuthMethod::ClientSecretPost => Some(super::random_token(32)),
            TokenEndpointAuthMethod::None => None,
        };

        let client = RegisteredClient {
            client_id: super::random_token(24),
            client_secret,
            client_name: metadata
                .client_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
            redirect_uris,
            grant_types,
            response_types,
            token_endpoint_auth_method: auth_method,
            created_at: super::now(),
        };

        self.reserve_slot()?;
        if let Err(e) = self.store.set(&client.client_id, &client, None).await {
            self.registered.fetch_sub(1, Ordering::AcqRel);
            return Err(e.into());
        }
        info!(
            "Registered client '{}' ({}) with {} redirect URI(s)",
            client.client_name,
            client.client_id,
            client.redirect_uris.len()
        );
        Ok(client)
    }

    /// Look up a client by id
    pub async fn lookup(&self, client_id: &str) -> Result<Option<RegisteredClient>, StoreError> {
        if client_id.is_empty() {
            return Ok(None);
        }
        self.store.get(client_id).await
    }
}

/// Absolute URI without a fragment (RFC 6749 section 3.1.2)
fn validate_redirect_uri(uri: &str) -> Result<(), RegistrationError> {
    let parsed = Url::parse(uri).map_err(|_| RegistrationError::InvalidRedirectUri(uri.to_string()))?;
    if parsed.fragment().is_some() || matches!(parsed.scheme(), "javascript" | "data" | "file") {
        return Err(RegistrationError::InvalidRedirectUri(uri.to_string()));
    }
    Ok(())
}
