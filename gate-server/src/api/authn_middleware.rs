use crate::oauth::tokens::TokenError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, error, warn};
use serde_json::json;

/// Who is calling, resolved from the bearer token. Inserted into the request
/// extensions for the tool handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedSubject {
    pub subject_id: String,
    pub client_id: String,
    pub scope: String,
}

/// Why a protected request was refused
#[derive(Debug)]
pub(crate) enum AccessError {
    /// No usable bearer token in the request (401)
    MissingToken,
    /// The token failed validation (401)
    InvalidToken(&'static str),
    /// Valid token for someone other than the creator (403)
    Forbidden,
    /// The deny-list could not be consulted (503)
    Unavailable,
}

impl AccessError {
    fn respond(self, realm: &str, resource_metadata: &str) -> Response {
        match self {
            Self::MissingToken => unauthorized(
                realm,
                resource_metadata,
                "Missing or invalid Authorization header",
            ),
            Self::InvalidToken(description) => unauthorized(realm, resource_metadata, description),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "forbidden",
                    "error_description": "Access denied: not authorized for this server",
                })),
            )
                .into_response(),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "temporarily_unavailable",
                    "error_description": "Token validation is unavailable",
                })),
            )
                .into_response(),
        }
    }
}

/// 401 with an RFC 9728 challenge pointing to the protected-resource metadata
fn unauthorized(realm: &str, resource_metadata: &str, description: &str) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "error_description": description,
        })),
    )
        .into_response();

    let challenge = format!(
        "Bearer realm=\"{}\", resource_metadata=\"{}\"",
        realm, resource_metadata
    );
    match HeaderValue::from_str(&challenge) {
        Ok(value) => {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        Err(e) => error!("Failed to build WWW-Authenticate header: {}", e),
    }
    response
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_owned())
}

async fn authorize_request(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthenticatedSubject, AccessError> {
    let Some(token) = bearer_token(headers) else {
        debug!("Request rejected: no Bearer token");
        return Err(AccessError::MissingToken);
    };

    let claims = match state.tokens.validate(&token).await {
        Ok(claims) => claims,
        Err(TokenError::Store(e)) => {
            error!("Failed to check the token deny-list: {}", e);
            return Err(AccessError::Unavailable);
        }
        Err(TokenError::Expired) => {
            debug!("Request rejected: expired token");
            return Err(AccessError::InvalidToken("Token has expired"));
        }
        Err(e) => {
            warn!("Request rejected: {}", e);
            return Err(AccessError::InvalidToken("Invalid or expired token"));
        }
    };

    // The creator can change after the token was issued, so check on every request
    if !state.creator.permits(&claims.sub).await {
        warn!("Access denied: user '{}' is not the server creator", claims.sub);
        return Err(AccessError::Forbidden);
    }

    Ok(AuthenticatedSubject {
        subject_id: claims.sub,
        client_id: claims.client_id,
        scope: claims.scope,
    })
}

pub(super) async fn authentication_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = authorize_request(&state, request.headers()).await;
    match authorized {
        Ok(subject) => {
            request.extensions_mut().insert(subject);
            next.run(request).await
        }
        Err(err) => err.respond(
            &state.config.oauth.realm,
            &state.config.oauth.resource_metadata_url(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use axum::routing::get;
    use axum::{Extension, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const TEST_ROUTE: &str = "/test";

    async fn whoami(Extension(subject): Extension<AuthenticatedSubject>) -> String {
        subject.subject_id
    }

    /// Helper function to set up a mock app with authentication middleware
    fn setup_authn_mock_app(config: &GateConfig) -> (Router, AppState) {
        let state = AppState::for_testing(config);

        let app = Router::new()
            .route(TEST_ROUTE, get(whoami))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                authentication_middleware,
            ))
            .with_state(state.clone());
        (app, state)
    }

    /// Helper function to build a request with optional authorization header
    async fn send_request(
        app: &Router,
        auth_header: Option<&str>,
    ) -> (StatusCode, Option<String>, String) {
        let mut request_builder = Request::builder().uri(TEST_ROUTE);

        if let Some(auth) = auth_header {
            request_builder = request_builder.header("Authorization", auth);
        }

        let request = request_builder
            .body(Body::empty())
            .expect("Failed to build request");

        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .map(|value| value.to_str().unwrap().to_string());
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let body = String::from_utf8(body_bytes.to_vec())
            .expect("Failed to convert response body to string");

        (status, challenge, body)
    }

    #[tokio::test]
    async fn test_creator_token_passes_and_sets_subject() {
        let (app, state) = setup_authn_mock_app(&GateConfig::for_testing());
        let token = state.tokens.issue("creator-id", "client", "mcp:tools").unwrap();

        let (status, _, body) =
            send_request(&app, Some(&format!("Bearer {}", token.access_token))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "creator-id");
    }

    #[tokio::test]
    async fn test_missing_authorization_header() {
        let (app, _) = setup_authn_mock_app(&GateConfig::for_testing());
        let (status, challenge, body) = send_request(&app, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            challenge.unwrap(),
            "Bearer realm=\"mcp\", resource_metadata=\"https://gate.example/.well-known/oauth-protected-resource\""
        );
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_invalid_authorization_format() {
        let (app, _) = setup_authn_mock_app(&GateConfig::for_testing());

        for header in ["creator-token", "Basic abc", "Bearer "] {
            let (status, challenge, _) = send_request(&app, Some(header)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "header {header:?}");
            assert!(challenge.unwrap().contains("resource_metadata="));
        }
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let (app, _) = setup_authn_mock_app(&GateConfig::for_testing());
        let (status, challenge, _) = send_request(&app, Some("Bearer not-a-jwt")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(challenge.is_some());
    }

    #[tokio::test]
    async fn test_non_creator_token_is_forbidden() {
        let (app, state) = setup_authn_mock_app(&GateConfig::for_testing());
        let token = state.tokens.issue("guest-id", "client", "mcp:tools").unwrap();

        let (status, challenge, body) =
            send_request(&app, Some(&format!("Bearer {}", token.access_token))).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(challenge.is_none());
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "forbidden");
    }

    #[tokio::test]
    async fn test_enforcement_off_allows_any_subject() {
        let mut config = GateConfig::for_testing();
        config.creator.enforce = false;
        let (app, state) = setup_authn_mock_app(&config);
        let token = state.tokens.issue("guest-id", "client", "mcp:tools").unwrap();

        let (status, _, body) =
            send_request(&app, Some(&format!("Bearer {}", token.access_token))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "guest-id");
    }

    #[tokio::test]
    async fn test_revoked_token_is_unauthorized() {
        let (app, state) = setup_authn_mock_app(&GateConfig::for_testing());
        let token = state.tokens.issue("creator-id", "client", "mcp:tools").unwrap();
        assert!(state.tokens.revoke(&token.access_token).await.unwrap());

        let (status, _, _) =
            send_request(&app, Some(&format!("Bearer {}", token.access_token))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    fn assert_send<T: Send>(value: T) -> T {
        value
    }

    #[tokio::test]
    async fn test_authorization_future_is_send() {
        let state = AppState::for_testing(&GateConfig::for_testing());
        let token = state.tokens.issue("creator-id", "client", "mcp:tools").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.access_token)).unwrap(),
        );

        // Must be spawnable by the server, like any middleware future
        let subject = assert_send(authorize_request(&state, &headers)).await.unwrap();
        assert_eq!(subject.subject_id, "creator-id");
    }

    #[tokio::test]
    async fn test_route_layer_guards_protected_routes() {
        let state = AppState::for_testing(&GateConfig::for_testing());
        let app = Router::new()
            .route(TEST_ROUTE, get(whoami))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                authentication_middleware,
            ))
            .with_state(state.clone());
        let token = state.tokens.issue("creator-id", "client", "mcp:tools").unwrap();

        let (status, _, _) = send_request(&app, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) =
            send_request(&app, Some(&format!("Bearer {}", token.access_token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "creator-id");
    }

    #[test]
    fn test_bearer_token_parsing() {
        let header = |value: &str| {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
            headers
        };

        assert_eq!(bearer_token(&header("Bearer abc")).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&header("bearer  abc ")).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&header("Basic abc")), None);
        assert_eq!(bearer_token(&header("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
