mod common;

use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use cascade::{
    AppState,
    auth::{AuthUser, Claims, fetch_auth_context},
    config::Env,
    models::PermissionLevel,
};
use common::{ALICE, BU_A, MockBackend, app_state, context, membership};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::time::SystemTime;
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn create_token(user_id: Uuid, audience: &str, exp: u64) -> String {
    let claims = Claims {
        sub: user_id,
        aud: audience.to_string(),
        iat: now() as usize,
        exp: exp as usize,
        email: Some("alice@example.com".to_string()),
    };

    let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn create_app_state(env: Env, backend: MockBackend) -> AppState {
    let mut state = app_state(backend);
    state.config.env = env;
    state.config.jwt_secret = TEST_JWT_SECRET.to_string();
    state
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(token: &str) -> Parts {
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    parts
}

// --- AuthUser ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let token = create_token(ALICE, "authenticated", now() + 3600);
    let app_state = create_app_state(Env::Production, MockBackend::default());

    let mut parts = with_bearer(&token);
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user, Ok(AuthUser { id: ALICE }));
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, MockBackend::default());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    // Well past the default 60s leeway.
    let token = create_token(ALICE, "authenticated", now() - 3600);
    let app_state = create_app_state(Env::Production, MockBackend::default());

    let mut parts = with_bearer(&token);
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_wrong_audience() {
    let token = create_token(ALICE, "anon", now() + 3600);
    let app_state = create_app_state(Env::Production, MockBackend::default());

    let mut parts = with_bearer(&token);
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_wrong_secret() {
    let token = create_token(ALICE, "authenticated", now() + 3600);
    let mut app_state = create_app_state(Env::Production, MockBackend::default());
    app_state.config.jwt_secret = "another-secret-entirely".to_string();

    let mut parts = with_bearer(&token);
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let app_state = create_app_state(Env::Local, MockBackend::default());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&ALICE.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user, Ok(AuthUser { id: ALICE }));
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let app_state = create_app_state(Env::Production, MockBackend::default());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&ALICE.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

// --- fetch_auth_context ---

#[tokio::test]
async fn test_fetch_returns_context_for_valid_token() {
    let ctx = context(
        ALICE,
        &[],
        &[],
        vec![membership(BU_A, "Alpha", PermissionLevel::Approver)],
    );
    let app_state = create_app_state(Env::Production, MockBackend::with_context(ctx.clone()));
    let token = create_token(ALICE, "authenticated", now() + 3600);

    let mut parts = with_bearer(&token);
    let fetched = fetch_auth_context(&mut parts, &app_state).await;

    assert_eq!(fetched, Some(ctx));
}

#[tokio::test]
async fn test_fetch_drops_duplicate_memberships() {
    let ctx = context(
        ALICE,
        &[],
        &[],
        vec![
            membership(BU_A, "Alpha", PermissionLevel::Approver),
            membership(BU_A, "Alpha", PermissionLevel::BuAdmin),
        ],
    );
    let app_state = create_app_state(Env::Local, MockBackend::with_context(ctx));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&ALICE.to_string()).unwrap(),
    );
    let fetched = fetch_auth_context(&mut parts, &app_state).await.unwrap();

    assert_eq!(fetched.bu_permissions.len(), 1);
    assert_eq!(
        fetched.bu_permissions[0].permission_level,
        PermissionLevel::Approver
    );
}

#[tokio::test]
async fn test_fetch_is_none_without_credentials() {
    let ctx = context(ALICE, &[], &[], vec![]);
    let app_state = create_app_state(Env::Production, MockBackend::with_context(ctx));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    assert_eq!(fetch_auth_context(&mut parts, &app_state).await, None);
}

#[tokio::test]
async fn test_fetch_is_none_when_backend_fails() {
    let backend = MockBackend {
        fail: true,
        ..MockBackend::with_context(context(ALICE, &[], &[], vec![]))
    };
    let app_state = create_app_state(Env::Production, backend);
    let token = create_token(ALICE, "authenticated", now() + 3600);

    let mut parts = with_bearer(&token);
    assert_eq!(fetch_auth_context(&mut parts, &app_state).await, None);
}
