use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Nested under `/admin` behind the `SuperAdmin` gate. Non-admins are redirected to the
/// dashboard before any handler runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/organizations/{org_id}/business-units?bu_id=...
        // BU selector for any organization. Switching organizations re-runs auto-selection.
        .route(
            "/organizations/{org_id}/business-units",
            get(handlers::get_organization_business_units),
        )
}
