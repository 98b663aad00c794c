mod api;
mod config;
mod errors;
mod headers;
mod identity;
mod oauth;
mod openapi;
mod state;
mod store;
#[cfg(test)]
mod test_utils;
mod tools;

use crate::state::AppState;
use crate::store::ExpirySweep;
use axum::Router;
use log::{error, info};
use std::net::SocketAddr;
use std::time::Duration;
use sweeper::{PeriodicSweeper, SweeperOptions};
use tokio_util::sync::CancellationToken;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

#[tokio::main]
async fn main() {
    // Load configuration before logging so that `debug` can pick the level
    let config = config::GateConfig::new();
    let default_level = match &config {
        Ok(config) if config.debug => "debug",
        _ => "info",
    };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(default_level));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize application state
    let state = match AppState::new(&config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    // Purge expired clients, pending authorizations, codes and deny-list entries
    let shutdown_token = CancellationToken::new();
    let sweeper = PeriodicSweeper::start_with_token(
        ExpirySweep::new(state.stores.clone()),
        SweeperOptions {
            interval: Duration::from_secs(config.store.sweep_interval.max(1)),
            initial_delay: None,
        },
        shutdown_token.child_token(),
    );

    let app = create_app(state).await;

    // Build server address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // Start server
    let server = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!(
        "Server running on {} as {}, press Ctrl+C to stop",
        addr, config.oauth.server_url
    );
    let serve = axum::serve(server, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown_token.cancel();
    sweeper.shutdown().await;

    if let Err(e) = serve {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("Server shutdown complete");
}

/// Create a new application instance with a given state
pub async fn create_app(state: AppState) -> Router {
    // Create OpenAPI documentation
    let (openapi_router, api_doc) =
        OpenApiRouter::with_openapi(openapi::ApiDoc::openapi()).split_for_parts();

    // Create base router with routes
    Router::new()
        .merge(api::router(&state))
        .merge(openapi::router())
        .merge(openapi_router)
        .merge(Scalar::with_url("/scalar", api_doc))
        .with_state(state)
}

// Simple signal handler that works on all platforms
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
