use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints the login page and load balancers call before any session exists.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check. Returns "ok" immediately.
        .route("/health", get(|| async { "ok" }))
        // GET /config/public
        // Non-secret settings, currently the support link shown on the login page.
        .route("/config/public", get(handlers::get_public_config))
}
