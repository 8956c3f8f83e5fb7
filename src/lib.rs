use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core services: identity, data access and storage.
pub mod auth;
pub mod backend;
pub mod config;
pub mod identity;
pub mod models;
pub mod storage;

// Session resolution and authorization.
pub mod gate;
pub mod selector;
pub mod session;

// HTTP surface.
pub mod handlers;
pub mod routes;
use gate::{GateLayer, GateRequirement};
use routes::{admin, auditor, authenticated, organization, public};

// --- Public Re-exports ---

pub use backend::{BackendState, PostgresBackend};
pub use config::AppConfig;
pub use identity::{IdentityState, MockIdentityProvider, SupabaseAdminClient};
pub use session::SessionContext;
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every handler and schema, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_public_config, handlers::get_me, handlers::get_session,
        handlers::get_my_business_units, handlers::get_organization_business_units,
        handlers::get_auditor_requests, handlers::get_request_progress,
        handlers::advance_request, handlers::get_presigned_url, handlers::get_download_url,
        handlers::delete_attachment, handlers::create_account, handlers::reset_member_password
    ),
    components(
        schemas(
            models::AuthContext, models::Profile, models::BuPermission, models::BuRole,
            models::PermissionLevel, models::GranularPermissions, models::Capability,
            models::SessionSnapshot, models::BusinessUnitOption,
            models::BusinessUnitSelectorView, models::PublicConfig,
            models::PresignedUrlRequest, models::PresignedUrlResponse,
            models::AttachmentKeyRequest, models::DownloadUrlResponse,
            models::CreateAccountRequest, models::CreatedAccount, models::ResetPasswordRequest,
        )
    ),
    tags(
        (name = "cascade", description = "Cascade session and authorization gateway")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, cheaply clonable container for every service a handler or gate needs.
#[derive(Clone)]
pub struct AppState {
    /// Stored-procedure access (auth context, business units, workflow RPCs).
    pub backend: BackendState,
    /// Attachment blob store.
    pub storage: StorageState,
    /// Auth service admin operations (account creation, password resets).
    pub identity: IdentityState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for BackendState {
    fn from_ref(app_state: &AppState) -> BackendState {
        app_state.backend.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// Wraps `tree` in the role gate for `requirement`.
fn gated(
    tree: Router<AppState>,
    state: &AppState,
    requirement: GateRequirement,
) -> Router<AppState> {
    tree.route_layer(middleware::from_fn_with_state(
        GateLayer::new(state.clone(), requirement),
        gate::role_gate,
    ))
}

/// create_router
///
/// Assembles the route trees, their gates and the observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        // Each gated tree resolves the session once and redirects callers it does not admit.
        .merge(gated(
            authenticated::authenticated_routes(),
            &state,
            GateRequirement::Authenticated,
        ))
        .nest(
            "/admin",
            gated(admin::admin_routes(), &state, GateRequirement::SuperAdmin),
        )
        .nest(
            "/organization",
            gated(
                organization::organization_routes(),
                &state,
                GateRequirement::OrganizationAdmin,
            ),
        )
        .nest(
            "/auditor",
            gated(auditor::auditor_routes(), &state, GateRequirement::Auditor),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, correlated by its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
