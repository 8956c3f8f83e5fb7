use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Auditor Router Module
///
/// Nested under `/auditor`. System auditors and BU auditors of any unit pass the gate.
pub fn auditor_routes() -> Router<AppState> {
    Router::new()
        // GET /auditor/requests
        // Requests within the caller's audit scope.
        .route("/requests", get(handlers::get_auditor_requests))
}
