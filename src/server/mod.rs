//! HTTP server wiring — shared state, router, and lifecycle.

pub mod auth;
pub mod routes;

use std::sync::Arc;

use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::flow::AuthorizationFlowCoordinator;
use crate::guard::InitializationGuard;
use crate::rbac::PermissionEvaluator;
use crate::token::TokenVerifier;
use crate::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Lazy provider initialization guard
    pub guard: Arc<InitializationGuard>,
    /// Bearer token verifier
    pub verifier: TokenVerifier,
    /// RBAC decision engine
    pub evaluator: PermissionEvaluator,
    /// Authorization-code flow coordinator
    pub flows: AuthorizationFlowCoordinator,
}

impl AppState {
    /// Build the full state graph from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let guard = Arc::new(InitializationGuard::new(config.provider.clone()));
        let verifier = TokenVerifier::new(Arc::clone(&guard), &config.provider);
        let evaluator = PermissionEvaluator::new(config.provider.resolve_client_id());
        let flows = AuthorizationFlowCoordinator::new(Arc::clone(&guard), config.provider.clone());

        Self {
            guard,
            verifier,
            evaluator,
            flows,
        }
    }
}

/// Build the CORS layer from configured origins.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Run the gateway until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn run(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::from_config(&config));
    let app = routes::create_router(state, &config);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("Cannot bind {addr}: {e}")))?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        provider = %config.provider.base_url,
        realm = %config.provider.realm,
        "OIDC gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    Ok(())
}

/// Resolve when a shutdown signal (Ctrl-C) arrives.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}

pub use routes::create_router;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_graph_builds_from_default_config() {
        let state = AppState::from_config(&Config::default());
        assert_eq!(state.flows.states().pending_count(), 0);
    }

    #[test]
    fn cors_layer_skips_bad_origins() {
        // One parseable origin, one not; the layer must still build.
        let _layer = cors_layer(&[
            "http://localhost:3000".to_string(),
            "not a header value\u{0}".to_string(),
        ]);
    }
}
