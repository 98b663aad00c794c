mod authn_middleware;
pub(crate) mod discovery;
pub(crate) mod health;
pub(crate) mod mcp;
pub(crate) mod oauth;

use crate::api::authn_middleware::authentication_middleware;
use crate::state::AppState;
use axum::{middleware, Router};

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(discovery::router())
        .merge(oauth::router())
        .merge(protected_routes(state))
}

/// Tool routes; every one of them requires a creator's bearer token
fn protected_routes(state: &AppState) -> Router<AppState> {
    mcp::router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        authentication_middleware,
    ))
}
