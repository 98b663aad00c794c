//! OAuth discovery documents (RFC 8414, RFC 9728)

use crate::config::OAuthConfig;
use crate::headers::CachePolicy;
use crate::oauth::pkce;
use crate::openapi::DISCOVERY_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;

/// Max age of the discovery documents in shared caches
const METADATA_MAX_AGE: u32 = 3600;

/// Authorization server metadata (RFC 8414)
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<&'static str>,
    pub response_modes_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
}

impl AuthorizationServerMetadata {
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            issuer: config.issuer().to_string(),
            authorization_endpoint: config.get_url("/authorize"),
            token_endpoint: config.get_url("/token"),
            registration_endpoint: config.get_url("/register"),
            revocation_endpoint: config.get_url("/revoke"),
            introspection_endpoint: config.get_url("/introspect"),
            scopes_supported: config.get_supported_scopes(),
            response_types_supported: vec!["code"],
            response_modes_supported: vec!["query"],
            grant_types_supported: vec!["authorization_code"],
            token_endpoint_auth_methods_supported: vec!["none", "client_secret_post"],
            code_challenge_methods_supported: pkce::supported_methods(config.allow_plain_pkce),
        }
    }
}

/// Protected resource metadata (RFC 9728)
#[derive(Debug, Serialize, ToSchema)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<&'static str>,
}

impl ProtectedResourceMetadata {
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            resource: config.issuer().to_string(),
            authorization_servers: vec![config.issuer().to_string()],
            scopes_supported: config.get_supported_scopes(),
            bearer_methods_supported: vec!["header"],
        }
    }
}

fn cacheable<T: Serialize>(body: T) -> Response {
    let mut response = Json(body).into_response();
    CachePolicy::Public { max_age: METADATA_MAX_AGE }.apply(&mut response);
    response
}

#[utoipa::path(
    get,
    path = "/.well-known/oauth-authorization-server",
    tag = DISCOVERY_TAG,
    responses(
        (status = 200, description = "Authorization server metadata", body = AuthorizationServerMetadata)
    )
)]
pub(crate) async fn authorization_server_metadata(State(state): State<AppState>) -> Response {
    cacheable(AuthorizationServerMetadata::from_config(&state.config.oauth))
}

#[utoipa::path(
    get,
    path = "/.well-known/oauth-protected-resource",
    tag = DISCOVERY_TAG,
    responses(
        (status = 200, description = "Protected resource metadata", body = ProtectedResourceMetadata)
    )
)]
pub(crate) async fn protected_resource_metadata(State(state): State<AppState>) -> Response {
    cacheable(ProtectedResourceMetadata::from_config(&state.config.oauth))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        )
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use serde_json::json;

    #[tokio::test]
    async fn test_authorization_server_metadata() {
        let fixture = TestFixture::new().await;
        let resp = fixture.get("/.well-known/oauth-authorization-server").await;

        resp.assert_ok();
        assert_eq!(resp.json["issuer"], "https://gate.example");
        assert_eq!(resp.json["authorization_endpoint"], "https://gate.example/authorize");
        assert_eq!(resp.json["token_endpoint"], "https://gate.example/token");
        assert_eq!(resp.json["registration_endpoint"], "https://gate.example/register");
        assert_eq!(resp.json["code_challenge_methods_supported"], json!(["S256"]));
        assert_eq!(resp.json["grant_types_supported"], json!(["authorization_code"]));
        assert_eq!(resp.json["response_types_supported"], json!(["code"]));
        assert_eq!(
            resp.json["token_endpoint_auth_methods_supported"],
            json!(["none", "client_secret_post"])
        );
    }

    #[tokio::test]
    async fn test_protected_resource_metadata() {
        let fixture = TestFixture::new().await;
        let resp = fixture.get("/.well-known/oauth-protected-resource").await;

        resp.assert_ok();
        assert_eq!(resp.json["resource"], "https://gate.example");
        assert_eq!(resp.json["authorization_servers"], json!(["https://gate.example"]));
        assert_eq!(resp.json["bearer_methods_supported"], json!(["header"]));
    }

    #[tokio::test]
    async fn test_metadata_is_cacheable() {
        let fixture = TestFixture::new().await;
        let resp = fixture.get("/.well-known/oauth-protected-resource").await;

        assert_eq!(
            resp.headers.get(http::header::CACHE_CONTROL).unwrap(),
            "public, max-age=3600"
        );
    }
}
