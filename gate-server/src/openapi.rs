use crate::state::AppState;
use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const DISCOVERY_TAG: &str = "Discovery API";
pub(crate) const OAUTH_TAG: &str = "OAuth 2.0";
pub(crate) const MCP_TAG: &str = "MCP API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = DISCOVERY_TAG, description = "Authorization server and protected resource metadata"),
        (name = OAUTH_TAG, description = "Registration, authorization, token, revocation and introspection"),
        (name = MCP_TAG, description = "Tool invocation, creator only"),
    ),
    paths(
        crate::api::health::health_check,
        crate::api::health::ready_check,
        crate::api::discovery::authorization_server_metadata,
        crate::api::discovery::protected_resource_metadata,
        crate::api::oauth::handlers::register,
        crate::api::oauth::handlers::authorize,
        crate::api::oauth::handlers::token,
        crate::api::oauth::handlers::revoke,
        crate::api::oauth::handlers::introspect,
        crate::api::mcp::mcp_endpoint,
    ),
    info(
        title = "Creator Gate API",
        description = "OAuth 2.1 authorization server guarding a creator-only MCP endpoint",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

/// Handler for the OpenAPI JSON specification endpoint
async fn openapi_json_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates a router for OpenAPI documentation routes
pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json_handler))
}
