use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    backend::BackendState,
    config::{AppConfig, Env},
    models::AuthContext,
};

/// Claims
///
/// The subset of a Supabase access token the gateway relies on.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the `auth.users.id` of the caller.
    pub sub: Uuid,
    /// Audience; Supabase issues `authenticated` for signed-in users.
    pub aud: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// AuthUser
///
/// The authenticated identity of a request. It carries no permissions: those come from
/// the auth context fetched for this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
}

/// AuthUser Extractor
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header holding a UUID is accepted.
/// 2. Otherwise a `Bearer` JWT is required, validated for signature, expiry and audience.
///
/// Rejection: `401` on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id_str| Uuid::parse_str(id_str).ok());
            if let Some(id) = bypass_id {
                return Ok(AuthUser { id });
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.set_audience(&[config.jwt_audience.as_str()]);

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!("rejected token: {:?}", other),
            }
            StatusCode::UNAUTHORIZED
        })?;

        Ok(AuthUser {
            id: token_data.claims.sub,
        })
    }
}

/// fetch_auth_context
///
/// Authenticates the request and fetches its permissions snapshot with a single
/// `get_user_auth_context` call. Every failure, including "not authenticated", collapses
/// to `None`; callers send the visitor to the login page.
pub async fn fetch_auth_context<S>(parts: &mut Parts, state: &S) -> Option<AuthContext>
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
    BackendState: FromRef<S>,
{
    let user = match AuthUser::from_request_parts(parts, state).await {
        Ok(user) => user,
        Err(_) => {
            tracing::debug!("request is not authenticated");
            return None;
        }
    };

    let backend = BackendState::from_ref(state);
    match backend.get_user_auth_context(user.id).await {
        Ok(Some(mut context)) => {
            let dropped = context.dedup_bu_permissions();
            if dropped > 0 {
                tracing::warn!(user_id = %user.id, dropped, "auth context listed a business unit twice");
            }
            Some(context)
        }
        Ok(None) => {
            tracing::warn!(user_id = %user.id, "no auth context for authenticated user");
            None
        }
        Err(e) => {
            tracing::warn!(user_id = %user.id, "auth context fetch failed: {}", e);
            None
        }
    }
}
