//! OAuth 2.1 authorization server endpoints
//!
//! ## Supported flows
//! - Dynamic Client Registration (RFC 7591)
//! - Authorization Code Grant with mandatory PKCE (RFC 6749 Section 4.1, RFC 7636)
//! - Token Revocation (RFC 7009)
//! - Token Introspection (RFC 7662)
//!
//! Sign-in and consent are served as HTML pages between `/authorize` and the
//! redirect back to the client.

pub mod handlers;
pub mod models;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// Creates OAuth 2.0 routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/authorize", get(handlers::authorize))
        .route("/login", get(handlers::login_page).post(handlers::login_submit))
        .route("/login/bridge", post(handlers::login_bridge))
        .route("/consent", get(handlers::consent_page).post(handlers::consent_submit))
        .route("/token", post(handlers::token))
        .route("/revoke", post(handlers::revoke))
        .route("/introspect", post(handlers::introspect))
}
