//! OAuth 2.0 endpoint handlers

use super::models::{
    BridgeRequest, ConsentForm, IntrospectionRequest, IntrospectionResponse, LoginForm,
    RegistrationResponse, RevocationRequest, SessionQuery, TokenResponse,
};
use crate::errors::{ApiError, OAuthError};
use crate::headers::CachePolicy;
use crate::identity::views::{ConsentPage, LoginPage, ViewError};
use crate::oauth::exchange::TokenRequest;
use crate::oauth::registry::ClientMetadata;
use crate::oauth::session::{AuthorizationRequest, AuthorizeError, LoginOutcome};
use crate::oauth::tokens::TokenError;
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Form, FromRequest, Query, Request, State},
    http::{
        header::{CONTENT_TYPE, LOCATION},
        StatusCode,
    },
    response::{Html, IntoResponse, Response},
    Json,
};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;

/// Dynamic client registration (RFC 7591)
#[utoipa::path(
    post,
    path = "/register",
    request_body = ClientMetadata,
    responses(
        (status = 201, description = "Client registered", body = RegistrationResponse),
        (status = 400, description = "Invalid client metadata", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub async fn register(
    State(state): State<AppState>,
    metadata: Result<Json<ClientMetadata>, JsonRejection>,
) -> Result<Response, OAuthError> {
    let Json(metadata) = metadata.map_err(|e| {
        debug!("Rejected registration body: {}", e);
        OAuthError::invalid_client_metadata("invalid_client_metadata", "Invalid JSON in request body")
    })?;

    let client = state.clients.register(metadata).await?;
    let mut response = (
        StatusCode::CREATED,
        Json(RegistrationResponse::from(client)),
    )
        .into_response();
    CachePolicy::NoStore.apply(&mut response);
    Ok(response)
}

/// OAuth 2.0 Authorization endpoint (RFC 6749 Section 4.1.1)
///
/// Never redirects on a validation error, so an unregistered redirect URI is
/// never followed.
#[utoipa::path(
    get,
    path = "/authorize",
    params(AuthorizationRequest),
    responses(
        (status = 302, description = "Redirect to the sign-in page"),
        (status = 400, description = "Invalid request", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub async fn authorize(
    State(state): State<AppState>,
    Query(request): Query<AuthorizationRequest>,
) -> Result<Response, OAuthError> {
    let session_key = state.sessions.begin(&request).await.map_err(|e| {
        warn!("Rejected authorization request: {}", e);
        OAuthError::from(e)
    })?;
    Ok(found(&format!("/login?session={session_key}")))
}

/// Sign-in form
pub async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    match state.sessions.pending(&query.session).await {
        Ok(pending) => render(
            StatusCode::OK,
            state.views.login(&LoginPage {
                session: &query.session,
                client_name: &pending.client_name,
                email: "",
                error: None,
            }),
        ),
        Err(e) => flow_error(&state, e),
    }
}

/// Sign-in form submission
pub async fn login_submit(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let outcome = state
        .sessions
        .login(&form.session, &form.email, &form.password)
        .await;
    login_outcome(&state, &form.session, &form.email, outcome).await
}

/// Credential-transfer bridge: the identity service's own login page posts
/// its session token here in the body
pub async fn login_bridge(
    State(state): State<AppState>,
    FormOrJson(request): FormOrJson<BridgeRequest>,
) -> Response {
    let outcome = state
        .sessions
        .bridge(&request.session, &request.access_token)
        .await;
    login_outcome(&state, &request.session, "", outcome).await
}

async fn login_outcome(
    state: &AppState,
    session_key: &str,
    email: &str,
    outcome: Result<LoginOutcome, AuthorizeError>,
) -> Response {
    match outcome {
        Ok(LoginOutcome::Consent(_)) => found(&format!("/consent?session={session_key}")),
        Ok(LoginOutcome::Redirect(url)) => found(&url),
        Ok(LoginOutcome::Retry(message)) => match state.sessions.pending(session_key).await {
            Ok(pending) => render(
                StatusCode::UNAUTHORIZED,
                state.views.login(&LoginPage {
                    session: session_key,
                    client_name: &pending.client_name,
                    email,
                    error: Some(message),
                }),
            ),
            Err(e) => flow_error(state, e),
        },
        Err(e) => flow_error(state, e),
    }
}

/// Consent page
pub async fn consent_page(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let pending = match state.sessions.pending(&query.session).await {
        Ok(pending) => pending,
        Err(e) => return flow_error(&state, e),
    };
    let Some(user) = &pending.user else {
        return found(&format!("/login?session={}", query.session));
    };

    let display_name = user.email.as_deref().unwrap_or(&user.user_id);
    render(
        StatusCode::OK,
        state.views.consent(&ConsentPage {
            session: &query.session,
            client_name: &pending.client_name,
            user: display_name,
            scope: &pending.scope,
        }),
    )
}

/// Consent decision
pub async fn consent_submit(
    State(state): State<AppState>,
    Form(form): Form<ConsentForm>,
) -> Response {
    let approve = match form.action.as_str() {
        "approve" => true,
        "deny" => false,
        _ => return OAuthError::invalid_request("action must be 'approve' or 'deny'").into_response(),
    };

    match state.sessions.decide(&form.session, approve).await {
        Ok(url) => found(&url),
        Err(AuthorizeError::NotAuthenticated) => found(&format!("/login?session={}", form.session)),
        Err(e) => flow_error(&state, e),
    }
}

/// OAuth 2.0 Token endpoint (RFC 6749 Section 4.1.3)
#[utoipa::path(
    post,
    path = "/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token issued successfully", body = TokenResponse),
        (status = 400, description = "Invalid request or grant", body = OAuthError),
        (status = 401, description = "Invalid client", body = OAuthError),
        (status = 500, description = "Internal server error", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub async fn token(
    State(state): State<AppState>,
    FormOrJson(request): FormOrJson<TokenRequest>,
) -> Result<Response, OAuthError> {
    info!(
        "OAuth token request from client_id: {}",
        request.client_id.as_deref().unwrap_or("<none>")
    );

    let issued = state.exchange.exchange(&request).await?;
    let mut response = Json(TokenResponse::from(issued)).into_response();
    CachePolicy::NoStore.apply(&mut response);
    Ok(response)
}

/// Token revocation (RFC 7009). Unknown and already invalid tokens are not an error.
#[utoipa::path(
    post,
    path = "/revoke",
    request_body(content = RevocationRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token revoked or already invalid"),
        (status = 400, description = "Missing token", body = OAuthError),
        (status = 503, description = "Revocation storage unavailable", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub async fn revoke(
    State(state): State<AppState>,
    FormOrJson(request): FormOrJson<RevocationRequest>,
) -> Result<StatusCode, OAuthError> {
    let token = request
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("token parameter is required"))?;

    match state.tokens.revoke(&token).await {
        Ok(revoked) => {
            debug!("Revocation request handled, revoked={}", revoked);
            Ok(StatusCode::OK)
        }
        Err(TokenError::Store(e)) => {
            error!("Failed to record revoked token: {}", e);
            Err(OAuthError::temporarily_unavailable(
                "Revocation storage is unavailable",
            ))
        }
        Err(e) => {
            debug!("Ignoring revocation of invalid token: {}", e);
            Ok(StatusCode::OK)
        }
    }
}

/// OAuth 2.0 Token Introspection endpoint (RFC 7662)
#[utoipa::path(
    post,
    path = "/introspect",
    request_body(content = IntrospectionRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token introspection result", body = IntrospectionResponse),
        (status = 400, description = "Missing token", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub async fn introspect(
    State(state): State<AppState>,
    FormOrJson(request): FormOrJson<IntrospectionRequest>,
) -> Result<Json<IntrospectionResponse>, OAuthError> {
    let token = request
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("token parameter is required"))?;

    match state.tokens.validate(&token).await {
        Ok(claims) => Ok(Json(IntrospectionResponse::from(claims))),
        Err(e) => {
            debug!("Introspected inactive token: {}", e);
            Ok(Json(IntrospectionResponse::inactive()))
        }
    }
}

/// Extractor accepting either a form-encoded or a JSON body
pub struct FormOrJson<T>(pub T);

impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = OAuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(value)| Self(value))
                .map_err(|_| OAuthError::invalid_request("Invalid JSON in request body"))
        } else {
            Form::<T>::from_request(req, state)
                .await
                .map(|Form(value)| Self(value))
                .map_err(|_| OAuthError::invalid_request("Invalid form data in request body"))
        }
    }
}

/// 302 Found, the status OAuth clients expect from the authorization flow
fn found(location: &str) -> Response {
    let mut response = (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response();
    CachePolicy::NoStore.apply(&mut response);
    response
}

fn render(status: StatusCode, page: Result<String, ViewError>) -> Response {
    match page {
        Ok(html) => {
            let mut response = (status, Html(html)).into_response();
            CachePolicy::NoStore.apply(&mut response);
            response
        }
        Err(e) => {
            error!("Failed to render page: {}", e);
            ApiError::internal("Failed to render page").into_response()
        }
    }
}

/// Flow errors on the HTML pages are shown as a page, never as a redirect
fn flow_error(state: &AppState, err: AuthorizeError) -> Response {
    let (status, heading, message) = match &err {
        AuthorizeError::SessionNotFound => (
            StatusCode::BAD_REQUEST,
            "Session expired",
            "This authorization request has expired or was already used. Please start again from your client.",
        ),
        AuthorizeError::Store(e) => {
            error!("Store error during authorization: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Temporarily unavailable",
                "The server could not complete the request. Please try again.",
            )
        }
        _ => {
            warn!("Authorization flow error: {}", err);
            (
                StatusCode::BAD_REQUEST,
                "Authorization failed",
                "The authorization request could not be completed.",
            )
        }
    };
    render(status, state.views.message(heading, message))
}
