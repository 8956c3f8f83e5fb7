#![allow(dead_code)]

use async_trait::async_trait;
use cascade::{
    AppState,
    backend::{Backend, BackendError},
    config::{AppConfig, Env},
    identity::MockIdentityProvider,
    models::{
        AuthContext, BuPermission, BusinessUnitMember, BusinessUnitOption, GranularPermissions, PermissionLevel,
    },
    storage::MockStorageService,
};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use uuid::Uuid;

// --- Fixtures ---

pub const ALICE: Uuid = Uuid::from_u128(0xA11CE);
pub const ORG_ID: Uuid = Uuid::from_u128(0x0126);
pub const BU_A: Uuid = Uuid::from_u128(0xA);
pub const BU_B: Uuid = Uuid::from_u128(0xB);
pub const BU_C: Uuid = Uuid::from_u128(0xC);
pub const REQUEST_ID: Uuid = Uuid::from_u128(0x5EC);

pub fn membership(bu: Uuid, name: &str, level: PermissionLevel) -> BuPermission {
    BuPermission {
        business_unit_id: bu,
        business_unit_name: name.to_string(),
        permission_level: level,
        role: None,
        granular_permissions: None,
    }
}

pub fn membership_with(
    bu: Uuid,
    name: &str,
    level: PermissionLevel,
    flags: GranularPermissions,
) -> BuPermission {
    BuPermission {
        granular_permissions: Some(flags),
        ..membership(bu, name, level)
    }
}

pub fn context(
    user_id: Uuid,
    system_roles: &[&str],
    organization_roles: &[&str],
    bu_permissions: Vec<BuPermission>,
) -> AuthContext {
    AuthContext {
        user_id,
        profile: None,
        system_roles: system_roles.iter().map(|role| role.to_string()).collect(),
        organization_roles: organization_roles
            .iter()
            .map(|role| role.to_string())
            .collect(),
        bu_permissions,
    }
}

pub fn bu_member(bu: Uuid, user_id: Uuid, level: PermissionLevel) -> BusinessUnitMember {
    BusinessUnitMember {
        user_id,
        business_unit_id: bu,
        permission_level: level,
        is_super_admin: false,
        is_org_admin: false,
    }
}

pub fn option(id: Uuid, name: &str) -> BusinessUnitOption {
    BusinessUnitOption {
        id,
        name: name.to_string(),
        organization_id: Some(ORG_ID),
    }
}

// --- Mock Backend ---

/// In-memory backend: canned answers per user, plus a log of membership writes.
#[derive(Default)]
pub struct MockBackend {
    pub contexts: HashMap<Uuid, AuthContext>,
    // Keyed by (business unit, member).
    pub members: HashMap<(Uuid, Uuid), BusinessUnitMember>,
    pub units: Vec<BusinessUnitOption>,
    pub organization_units: HashMap<Uuid, Vec<BusinessUnitOption>>,
    pub progress: Option<Value>,
    pub fail: bool,
    pub added_members: Mutex<Vec<(Uuid, Uuid, PermissionLevel)>>,
}

impl MockBackend {
    pub fn with_context(context: AuthContext) -> Self {
        let mut backend = Self::default();
        backend.contexts.insert(context.user_id, context);
        backend
    }

    pub fn with_member(member: BusinessUnitMember) -> Self {
        let mut backend = Self::default();
        backend
            .members
            .insert((member.business_unit_id, member.user_id), member);
        backend
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.fail {
            return Err(BackendError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn get_user_auth_context(
        &self,
        user_id: Uuid,
    ) -> Result<Option<AuthContext>, BackendError> {
        self.check()?;
        Ok(self.contexts.get(&user_id).cloned())
    }

    async fn get_business_units_for_user(
        &self,
        _user_id: Uuid,
    ) -> Result<Vec<BusinessUnitOption>, BackendError> {
        self.check()?;
        Ok(self.units.clone())
    }

    async fn get_business_units_for_organization(
        &self,
        _user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<BusinessUnitOption>, BackendError> {
        self.check()?;
        Ok(self
            .organization_units
            .get(&organization_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_business_unit_member(
        &self,
        _user_id: Uuid,
        business_unit_id: Uuid,
        member_id: Uuid,
        level: PermissionLevel,
    ) -> Result<(), BackendError> {
        self.check()?;
        self.added_members
            .lock()
            .unwrap()
            .push((business_unit_id, member_id, level));
        Ok(())
    }

    async fn get_business_unit_member(
        &self,
        _user_id: Uuid,
        business_unit_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<BusinessUnitMember>, BackendError> {
        self.check()?;
        Ok(self.members.get(&(business_unit_id, member_id)).cloned())
    }

    async fn get_auditor_requests(&self, user_id: Uuid) -> Result<Value, BackendError> {
        self.check()?;
        Ok(json!([{ "id": REQUEST_ID, "auditor": user_id }]))
    }

    async fn get_request_workflow_progress(
        &self,
        _user_id: Uuid,
        _request_id: Uuid,
    ) -> Result<Option<Value>, BackendError> {
        self.check()?;
        Ok(self.progress.clone())
    }

    async fn trigger_next_section(
        &self,
        _user_id: Uuid,
        request_id: Uuid,
    ) -> Result<Value, BackendError> {
        self.check()?;
        Ok(json!({ "request_id": request_id, "advanced": true }))
    }
}

// --- App State ---

pub fn local_config() -> AppConfig {
    AppConfig {
        env: Env::Local,
        ..AppConfig::default()
    }
}

pub fn app_state(backend: MockBackend) -> AppState {
    app_state_with(backend, MockStorageService::new(), MockIdentityProvider::new())
}

pub fn app_state_with(
    backend: MockBackend,
    storage: MockStorageService,
    identity: MockIdentityProvider,
) -> AppState {
    AppState {
        backend: Arc::new(backend),
        storage: Arc::new(storage),
        identity: Arc::new(identity),
        config: local_config(),
    }
}
