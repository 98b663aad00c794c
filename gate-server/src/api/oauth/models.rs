//! OAuth 2.0 request/response structures of the HTTP layer

use crate::oauth::registry::{RegisteredClient, TokenEndpointAuthMethod};
use crate::oauth::tokens::{AccessClaims, IssuedToken};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Client registration response (RFC 7591 section 3.2.1)
#[derive(Debug, Serialize, ToSchema)]
pub struct RegistrationResponse {
    pub client_id: String,
    /// Only for clients registered with client_secret_post
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// 0: the secret does not expire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<i64>,
    pub client_id_issued_at: i64,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
}

impl From<RegisteredClient> for RegistrationResponse {
    fn from(client: RegisteredClient) -> Self {
        Self {
            client_secret_expires_at: client.client_secret.as_ref().map(|_| 0),
            client_id: client.client_id,
            client_secret: client.client_secret,
            client_id_issued_at: client.created_at,
            client_name: client.client_name,
            redirect_uris: client.redirect_uris,
            grant_types: client.grant_types,
            response_types: client.response_types,
            token_endpoint_auth_method: client.token_endpoint_auth_method,
        }
    }
}

/// OAuth 2.0 Token Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// The access token string
    pub access_token: String,
    /// Token type - always "Bearer"
    pub token_type: String,
    /// Token expiration in seconds
    pub expires_in: u64,
    /// Granted scopes (space-separated)
    pub scope: String,
}

impl From<IssuedToken> for TokenResponse {
    fn from(token: IssuedToken) -> Self {
        Self {
            access_token: token.access_token,
            token_type: "Bearer".to_string(),
            expires_in: token.expires_in,
            scope: token.scope,
        }
    }
}

/// Token revocation request (RFC 7009)
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RevocationRequest {
    pub token: Option<String>,
    /// Ignored; only access tokens exist
    pub token_type_hint: Option<String>,
}

/// OAuth 2.0 Token Introspection Request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IntrospectionRequest {
    /// The token to introspect
    pub token: Option<String>,
}

/// OAuth 2.0 Token Introspection Response (RFC 7662)
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct IntrospectionResponse {
    /// Whether the token is active
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

impl From<AccessClaims> for IntrospectionResponse {
    fn from(claims: AccessClaims) -> Self {
        Self {
            active: true,
            sub: Some(claims.sub),
            client_id: Some(claims.client_id),
            scope: Some(claims.scope),
            token_type: Some("Bearer".to_string()),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            iss: Some(claims.iss),
        }
    }
}

/// Selects the pending authorization a page belongs to
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionQuery {
    pub session: String,
}

/// Sign-in form submission
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub session: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Credential-transfer bridge body: a session token from the identity
/// service's own login page, sent in the body instead of the URL
#[derive(Debug, Deserialize, ToSchema)]
pub struct BridgeRequest {
    pub session: String,
    pub access_token: String,
}

/// Consent form submission
#[derive(Debug, Deserialize)]
pub struct ConsentForm {
    pub session: String,
    /// "approve" or "deny"
    pub action: String,
}
