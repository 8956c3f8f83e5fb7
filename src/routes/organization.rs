use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Organization Router Module
///
/// Nested under `/organization` behind the `OrganizationAdmin` gate.
pub fn organization_routes() -> Router<AppState> {
    Router::new()
        // GET /organization/business-units?bu_id=...
        // The org admin's BU selector. Same options as `/me/business-units`; the stored
        // procedure already scopes them to the caller's organizations.
        .route("/business-units", get(handlers::get_my_business_units))
}
