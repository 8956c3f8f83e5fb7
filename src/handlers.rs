use crate::{
    AppState,
    config::AppConfig,
    identity::IdentityError,
    models::{
        AttachmentKeyRequest, AuthContext, BusinessUnitOption, BusinessUnitSelectorView,
        Capability, CreateAccountRequest, CreatedAccount, DownloadUrlResponse,
        PresignedUrlRequest, PresignedUrlResponse, PublicConfig, ResetPasswordRequest,
        SessionSnapshot,
    },
    selector::BusinessUnitSelector,
    session::{PermissionTier, SessionContext},
    storage::{ATTACHMENT_PREFIX, attachment_key},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// Auth provider minimum (Supabase default).
pub const MIN_PASSWORD_LEN: usize = 6;

// --- Query Structs ---

/// BuSelection
///
/// The BU the client currently has selected. Selection is never stored server-side, so
/// every BU-scoped view receives it per request.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BuSelection {
    /// Absent on first load; the first membership is used then.
    pub bu_id: Option<Uuid>,
}

// --- Helpers ---

/// Builds the selector for `units`, applies an explicit choice if it is listed, then the
/// auto-selection policy.
fn selector_view(
    mut session: SessionContext,
    units: Vec<BusinessUnitOption>,
    requested: Option<Uuid>,
) -> BusinessUnitSelectorView {
    let selector = BusinessUnitSelector::new(units);
    if let Some(id) = requested {
        if let Err(unknown) = selector.choose(&mut session, id) {
            tracing::debug!(business_unit_id = %unknown.0, "ignoring unlisted business unit");
        }
    }
    selector.sync(&mut session);
    selector.view(session.selected_bu_id())
}

/// Returns `403` unless the session holds `capability` in `business_unit_id`.
fn require_capability(
    session: &SessionContext,
    business_unit_id: Uuid,
    capability: Capability,
) -> Result<(), StatusCode> {
    if session
        .with_selected_bu(business_unit_id)
        .has_bu_permission(capability)?
    {
        Ok(())
    } else {
        tracing::info!(%business_unit_id, ?capability, "capability check failed");
        Err(StatusCode::FORBIDDEN)
    }
}

// --- Handlers ---

/// get_public_config
///
/// [Public Route] Settings the login page needs before a session exists.
#[utoipa::path(
    get,
    path = "/config/public",
    responses((status = 200, description = "Public settings", body = PublicConfig))
)]
pub async fn get_public_config(State(config): State<AppConfig>) -> Json<PublicConfig> {
    Json(PublicConfig {
        support_url: config.support_url,
    })
}

/// get_me
///
/// [Authenticated Route] The caller's full auth context, as resolved by the gate.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Auth context", body = AuthContext),
        (status = 303, description = "Not signed in")
    )
)]
pub async fn get_me(session: SessionContext) -> Result<Json<AuthContext>, StatusCode> {
    Ok(Json(session.auth_context()?.clone()))
}

/// get_session
///
/// [Authenticated Route] Every derived predicate for the selected BU. Without `bu_id`
/// the first membership is selected.
#[utoipa::path(
    get,
    path = "/me/session",
    params(BuSelection),
    responses((status = 200, description = "Derived permissions", body = SessionSnapshot))
)]
pub async fn get_session(
    mut session: SessionContext,
    Query(selection): Query<BuSelection>,
) -> Result<Json<SessionSnapshot>, StatusCode> {
    if selection.bu_id.is_some() {
        session.set_selected_bu_id(selection.bu_id);
    }
    Ok(Json(session.snapshot()?))
}

/// get_my_business_units
///
/// [Authenticated Route] The BU dropdown for the caller.
#[utoipa::path(
    get,
    path = "/me/business-units",
    params(BuSelection),
    responses(
        (status = 200, description = "Selector view", body = BusinessUnitSelectorView),
        (status = 500, description = "Backend failure")
    )
)]
pub async fn get_my_business_units(
    session: SessionContext,
    State(state): State<AppState>,
    Query(selection): Query<BuSelection>,
) -> Result<Json<BusinessUnitSelectorView>, StatusCode> {
    let user_id = session.auth_context()?.user_id;
    let units = state
        .backend
        .get_business_units_for_user(user_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(selector_view(session, units, selection.bu_id)))
}

/// get_organization_business_units
///
/// [Super Admin Route] The BU dropdown for another organization. A selection from the
/// previous organization does not carry over; the first unit by name is picked instead.
#[utoipa::path(
    get,
    path = "/admin/organizations/{org_id}/business-units",
    params(("org_id" = Uuid, Path, description = "Organization ID"), BuSelection),
    responses((status = 200, description = "Selector view", body = BusinessUnitSelectorView))
)]
pub async fn get_organization_business_units(
    session: SessionContext,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Query(selection): Query<BuSelection>,
) -> Result<Json<BusinessUnitSelectorView>, StatusCode> {
    let user_id = session.auth_context()?.user_id;
    let units = state
        .backend
        .get_business_units_for_organization(user_id, org_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(selector_view(session, units, selection.bu_id)))
}

/// get_auditor_requests
///
/// [Auditor Route] Requests visible to the caller's audit scope. The stored procedure
/// decides the scope; the payload is passed through untouched.
#[utoipa::path(
    get,
    path = "/auditor/requests",
    responses((status = 200, description = "Auditable requests", body = Object))
)]
pub async fn get_auditor_requests(
    session: SessionContext,
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    let user_id = session.auth_context()?.user_id;
    state
        .backend
        .get_auditor_requests(user_id)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// get_request_progress
///
/// [Authenticated Route] Workflow progress of one request (sections, steps, approvals).
#[utoipa::path(
    get,
    path = "/requests/{id}/progress",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Progress", body = Object),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn get_request_progress(
    session: SessionContext,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    let user_id = session.auth_context()?.user_id;
    match state
        .backend
        .get_request_workflow_progress(user_id, request_id)
        .await
    {
        Ok(Some(progress)) => Ok(Json(progress)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// advance_request
///
/// [Authenticated Route] Asks the backend to move a request to its next workflow section.
/// Whether the caller may do so is decided by the stored procedure.
#[utoipa::path(
    post,
    path = "/requests/{id}/sections/next",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses((status = 200, description = "Procedure result", body = Object))
)]
pub async fn advance_request(
    session: SessionContext,
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    let user_id = session.auth_context()?.user_id;
    let result = state
        .backend
        .trigger_next_section(user_id, request_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    tracing::info!(%user_id, %request_id, "triggered next workflow section");
    Ok(Json(result))
}

/// get_presigned_url
///
/// [Authenticated Route] Short-lived upload URL for a request attachment. The object key
/// is generated here; clients never choose it.
#[utoipa::path(
    post,
    path = "/attachments/presigned",
    request_body = PresignedUrlRequest,
    responses((status = 200, description = "URL", body = PresignedUrlResponse))
)]
pub async fn get_presigned_url(
    _session: SessionContext,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> impl IntoResponse {
    let extension = std::path::Path::new(&payload.filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("bin");
    let object_key = match payload.request_id {
        Some(request_id) => format!(
            "{}{}/{}.{}",
            ATTACHMENT_PREFIX,
            request_id,
            Uuid::new_v4(),
            extension
        ),
        None => format!("{}{}.{}", ATTACHMENT_PREFIX, Uuid::new_v4(), extension),
    };

    match state
        .storage
        .get_presigned_upload_url(&object_key, &payload.file_type)
        .await
    {
        Ok(url) => {
            let response = PresignedUrlResponse {
                upload_url: url,
                resource_key: object_key,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            tracing::error!("storage error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed").into_response()
        }
    }
}

/// get_download_url
///
/// [Authenticated Route] Short-lived download URL for an existing attachment.
#[utoipa::path(
    post,
    path = "/attachments/download-url",
    request_body = AttachmentKeyRequest,
    responses(
        (status = 200, description = "URL", body = DownloadUrlResponse),
        (status = 400, description = "Key outside the attachment area")
    )
)]
pub async fn get_download_url(
    _session: SessionContext,
    State(state): State<AppState>,
    Json(payload): Json<AttachmentKeyRequest>,
) -> Result<Json<DownloadUrlResponse>, StatusCode> {
    let key = attachment_key(&payload.key).ok_or(StatusCode::BAD_REQUEST)?;
    let url = state
        .storage
        .get_presigned_download_url(&key)
        .await
        .map_err(|e| {
            tracing::error!("storage error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(DownloadUrlResponse { url }))
}

/// delete_attachment
///
/// [Authenticated Route] Removes an attachment object.
#[utoipa::path(
    delete,
    path = "/attachments",
    request_body = AttachmentKeyRequest,
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Key outside the attachment area")
    )
)]
pub async fn delete_attachment(
    session: SessionContext,
    State(state): State<AppState>,
    Json(payload): Json<AttachmentKeyRequest>,
) -> StatusCode {
    let Some(key) = attachment_key(&payload.key) else {
        return StatusCode::BAD_REQUEST;
    };
    match state.storage.delete_object(&key).await {
        Ok(()) => {
            if let Ok(ctx) = session.auth_context() {
                tracing::info!(user_id = %ctx.user_id, key = %key, "attachment deleted");
            }
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            tracing::error!("storage error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// create_account
///
/// [Authenticated Route] Creates an employee account and adds it to a BU.
///
/// *Authorization*: requires `can_create_accounts` in that BU (admin tiers always pass).
/// Granting `BU_ADMIN` additionally requires the caller to be a BU admin or above there.
///
/// The Auth account is deleted again when the membership cannot be written, so a failed
/// request can be retried with the same email.
#[utoipa::path(
    post,
    path = "/business-units/{bu_id}/accounts",
    params(("bu_id" = Uuid, Path, description = "Business unit ID")),
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Created", body = CreatedAccount),
        (status = 400, description = "Missing field or rejected by the auth service"),
        (status = 403, description = "Missing capability, or level above the caller's tier")
    )
)]
pub async fn create_account(
    session: SessionContext,
    State(state): State<AppState>,
    Path(bu_id): Path<Uuid>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<CreatedAccount>), StatusCode> {
    require_capability(&session, bu_id, Capability::CreateAccounts)?;
    let caller_tier = session.tier_in(bu_id)?;
    if !caller_tier.can_grant(payload.permission_level) {
        tracing::info!(%bu_id, ?caller_tier, level = ?payload.permission_level, "level above caller's tier");
        return Err(StatusCode::FORBIDDEN);
    }

    let email = payload.email.trim();
    if email.is_empty() || payload.password.len() < MIN_PASSWORD_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let new_user_id = state
        .identity
        .create_account(email, &payload.password)
        .await
        .map_err(|e| match e {
            IdentityError::Rejected(status) => {
                tracing::info!(%status, "account creation rejected");
                StatusCode::BAD_REQUEST
            }
            IdentityError::Transport(e) => {
                tracing::error!("auth service error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    let actor_id = session.auth_context()?.user_id;
    if state
        .backend
        .add_business_unit_member(actor_id, bu_id, new_user_id, payload.permission_level)
        .await
        .is_err()
    {
        // Roll back the Auth account; only a log line is left if that fails too.
        if let Err(e) = state.identity.delete_account(new_user_id).await {
            tracing::error!(%new_user_id, "orphaned account after membership failure: {}", e);
        }
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    tracing::info!(%actor_id, %bu_id, %new_user_id, "account created");
    Ok((
        StatusCode::CREATED,
        Json(CreatedAccount {
            user_id: new_user_id,
            email: email.to_string(),
            business_unit_id: bu_id,
            permission_level: payload.permission_level,
        }),
    ))
}

/// reset_member_password
///
/// [Authenticated Route] Sets a new password for a member of a BU.
///
/// *Authorization*:
/// 1. The caller holds `can_reset_passwords` in that BU.
/// 2. The target is a member of that BU (`get_business_unit_member`), otherwise `404`.
/// 3. The target's tier does not exceed the caller's tier in that BU, otherwise `403`.
///
/// The Auth admin API runs with the service role key, so these checks are the only ones
/// applied to the call.
#[utoipa::path(
    post,
    path = "/business-units/{bu_id}/members/{user_id}/password-reset",
    params(
        ("bu_id" = Uuid, Path, description = "Business unit ID"),
        ("user_id" = Uuid, Path, description = "Member ID")
    ),
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Password too short"),
        (status = 403, description = "Missing capability, or target above the caller's tier"),
        (status = 404, description = "Not a member of the business unit")
    )
)]
pub async fn reset_member_password(
    session: SessionContext,
    State(state): State<AppState>,
    Path((bu_id, member_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode, StatusCode> {
    require_capability(&session, bu_id, Capability::ResetPasswords)?;
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let actor_id = session.auth_context()?.user_id;
    let member = state
        .backend
        .get_business_unit_member(actor_id, bu_id, member_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or_else(|| {
            tracing::info!(%bu_id, %member_id, "password reset target is not a member");
            StatusCode::NOT_FOUND
        })?;

    let caller_tier = session.tier_in(bu_id)?;
    let target_tier = PermissionTier::of_member(&member);
    if target_tier > caller_tier {
        tracing::warn!(
            %actor_id,
            %member_id,
            ?caller_tier,
            ?target_tier,
            "password reset of a higher tier refused"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    match state
        .identity
        .set_password(member_id, &payload.new_password)
        .await
    {
        Ok(()) => {
            tracing::info!(%actor_id, %bu_id, %member_id, "member password reset");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(IdentityError::Rejected(status)) if status == StatusCode::NOT_FOUND => {
            Err(StatusCode::NOT_FOUND)
        }
        Err(IdentityError::Rejected(status)) => {
            tracing::info!(%status, "password reset rejected");
            Err(StatusCode::BAD_REQUEST)
        }
        Err(IdentityError::Transport(e)) => {
            tracing::error!("auth service error: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
