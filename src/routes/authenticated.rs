use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Authenticated Router Module
///
/// Routes for any caller whose auth context resolved. The gate attaches a
/// `SessionContext` to each request; handlers needing a BU capability check it against
/// the BU named in the path, not the caller's current selection.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Session ---
        // GET /me
        // The raw auth context: profile, system roles, organization roles and BU memberships.
        .route("/me", get(handlers::get_me))
        // GET /me/session?bu_id=...
        // Derived predicates (admin tiers, auditor flags, capabilities) for the selected BU.
        .route("/me/session", get(handlers::get_session))
        // GET /me/business-units?bu_id=...
        // The BU selector: options sorted by name, visibility and the effective selection.
        .route("/me/business-units", get(handlers::get_my_business_units))
        // --- Requests ---
        // GET /requests/{id}/progress
        // Workflow progress for one request. 404 when the caller cannot see it.
        .route("/requests/{id}/progress", get(handlers::get_request_progress))
        // POST /requests/{id}/sections/next
        // Moves a request to its next workflow section.
        .route(
            "/requests/{id}/sections/next",
            post(handlers::advance_request),
        )
        // --- Attachments ---
        // POST /attachments/presigned
        // Presigned PUT URL (10 minutes) for uploading straight to object storage.
        .route("/attachments/presigned", post(handlers::get_presigned_url))
        // POST /attachments/download-url
        // Presigned GET URL for an existing attachment key.
        .route(
            "/attachments/download-url",
            post(handlers::get_download_url),
        )
        // DELETE /attachments
        // Removes an attachment. The key travels in the body.
        .route("/attachments", delete(handlers::delete_attachment))
        // --- BU administration ---
        // POST /business-units/{bu_id}/accounts
        // Creates an account and adds it to the BU. Needs `can_create_accounts` there.
        .route(
            "/business-units/{bu_id}/accounts",
            post(handlers::create_account),
        )
        // POST /business-units/{bu_id}/members/{user_id}/password-reset
        // Needs `can_reset_passwords` in that BU. The target must be a member there,
        // of no higher tier than the caller.
        .route(
            "/business-units/{bu_id}/members/{user_id}/password-reset",
            post(handlers::reset_member_password),
        )
}
