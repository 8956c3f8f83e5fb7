use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The Auth service answered with a non-success status (duplicate email, weak password...).
    #[error("auth service rejected the request with status {0}")]
    Rejected(StatusCode),
    #[error("auth service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// IdentityProvider
///
/// Account operations that only the Auth service can perform. The gateway checks the
/// caller's BU capabilities before calling any of these.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates a pre-confirmed account and returns its `auth.users.id`.
    async fn create_account(&self, email: &str, password: &str) -> Result<Uuid, IdentityError>;

    async fn set_password(&self, user_id: Uuid, password: &str) -> Result<(), IdentityError>;

    /// Removes an account. Used to roll back a creation whose BU membership failed.
    async fn delete_account(&self, user_id: Uuid) -> Result<(), IdentityError>;
}

pub type IdentityState = Arc<dyn IdentityProvider>;

/// Minimal view of the Auth admin API's user object.
#[derive(Deserialize)]
struct AdminUserResponse {
    id: Uuid,
}

/// SupabaseAdminClient
///
/// Talks to `/auth/v1/admin/*` with the service role key.
#[derive(Clone)]
pub struct SupabaseAdminClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl SupabaseAdminClient {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    fn admin_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/auth/v1/admin/{}", self.base_url, path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAdminClient {
    async fn create_account(&self, email: &str, password: &str) -> Result<Uuid, IdentityError> {
        let response = self
            .admin_request(reqwest::Method::POST, "users")
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "email_confirm": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Rejected(response.status()));
        }

        let user = response.json::<AdminUserResponse>().await?;
        Ok(user.id)
    }

    async fn set_password(&self, user_id: Uuid, password: &str) -> Result<(), IdentityError> {
        let response = self
            .admin_request(reqwest::Method::PUT, &format!("users/{}", user_id))
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Rejected(response.status()));
        }
        Ok(())
    }

    async fn delete_account(&self, user_id: Uuid) -> Result<(), IdentityError> {
        let response = self
            .admin_request(reqwest::Method::DELETE, &format!("users/{}", user_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Rejected(response.status()));
        }
        Ok(())
    }
}

/// MockIdentityProvider
///
/// In-memory provider for tests: records every call and hands out deterministic ids.
#[derive(Default)]
pub struct MockIdentityProvider {
    /// When true, every operation is rejected with `422`.
    pub should_fail: bool,
    /// Emails of created accounts, in creation order.
    pub created: Mutex<Vec<String>>,
    pub password_resets: Mutex<Vec<Uuid>>,
    pub deleted: Mutex<Vec<Uuid>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// The id handed out for the `n`th created account (0-based).
    pub fn account_id(n: usize) -> Uuid {
        Uuid::from_u128(0xACC0_0000 + n as u128)
    }

    /// Ids of created accounts that were not deleted afterwards.
    pub fn surviving_accounts(&self) -> Vec<Uuid> {
        let created = self.created.lock().unwrap_or_else(|e| e.into_inner()).len();
        let deleted = self.deleted.lock().unwrap_or_else(|e| e.into_inner());
        (0..created)
            .map(Self::account_id)
            .filter(|id| !deleted.contains(id))
            .collect()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn create_account(&self, email: &str, _password: &str) -> Result<Uuid, IdentityError> {
        if self.should_fail {
            return Err(IdentityError::Rejected(StatusCode::UNPROCESSABLE_ENTITY));
        }
        let mut created = self.created.lock().unwrap_or_else(|e| e.into_inner());
        let id = Self::account_id(created.len());
        created.push(email.to_string());
        Ok(id)
    }

    async fn set_password(&self, user_id: Uuid, _password: &str) -> Result<(), IdentityError> {
        if self.should_fail {
            return Err(IdentityError::Rejected(StatusCode::UNPROCESSABLE_ENTITY));
        }
        self.password_resets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user_id);
        Ok(())
    }

    async fn delete_account(&self, user_id: Uuid) -> Result<(), IdentityError> {
        if self.should_fail {
            return Err(IdentityError::Rejected(StatusCode::UNPROCESSABLE_ENTITY));
        }
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user_id);
        Ok(())
    }
}
