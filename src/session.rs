//! Session context: the per-request authorization snapshot and the predicates derived
//! from it.
//!
//! The snapshot itself is immutable. The only mutable piece is the selected business
//! unit, and every change to it re-derives the memoized view in one place, so gates,
//! handlers and the BU selector all read the same answers.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{
        AuthContext, BuPermission, BusinessUnitMember, Capability, GranularPermissions,
        PermissionLevel, SessionSnapshot,
    },
    selector::BusinessUnitSink,
};

/// Highest privilege tier, held in `system_roles`.
pub const SUPER_ADMIN: &str = "Super Admin";
/// System-wide audit role, held in `system_roles`.
pub const SYSTEM_AUDITOR: &str = "AUDITOR";
/// Organization tier, held in `organization_roles`.
pub const ORGANIZATION_ADMIN: &str = "Organization Admin";

/// Raised by every predicate of an unresolved session. Handlers turn it into a 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A predicate was evaluated before any auth context was provided.
    #[error("session context used outside of its provider")]
    OutsideProvider,
}

impl From<SessionError> for StatusCode {
    fn from(e: SessionError) -> Self {
        tracing::error!("{}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// PermissionTier
///
/// Ordered privilege tiers, used when one user acts on another (password resets,
/// granting levels). A user's tier is always taken relative to one BU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PermissionTier {
    /// Any level below `BU_ADMIN`, or no membership at all.
    Member,
    BuAdmin,
    OrganizationAdmin,
    SuperAdmin,
}

impl PermissionTier {
    fn from_parts(is_super_admin: bool, is_org_admin: bool, level: Option<PermissionLevel>) -> Self {
        if is_super_admin {
            PermissionTier::SuperAdmin
        } else if is_org_admin {
            PermissionTier::OrganizationAdmin
        } else if level == Some(PermissionLevel::BuAdmin) {
            PermissionTier::BuAdmin
        } else {
            PermissionTier::Member
        }
    }

    /// The tier of a target user as reported by the backend.
    pub fn of_member(member: &BusinessUnitMember) -> Self {
        Self::from_parts(
            member.is_super_admin,
            member.is_org_admin,
            Some(member.permission_level),
        )
    }

    /// Only BU admins and above may hand out `BU_ADMIN`; every other level is open to any
    /// holder of `can_create_accounts`.
    pub fn can_grant(self, level: PermissionLevel) -> bool {
        match level {
            PermissionLevel::BuAdmin => self >= PermissionTier::BuAdmin,
            _ => true,
        }
    }
}

/// Memoized predicates, keyed on (auth context, selected BU id).
#[derive(Debug, Clone, PartialEq)]
struct Derived {
    is_super_admin: bool,
    is_org_admin: bool,
    is_system_auditor: bool,
    is_bu_auditor: bool,
    current_index: Option<usize>,
    capabilities: GranularPermissions,
}

impl Derived {
    fn compute(auth: &AuthContext, selected_bu_id: Option<Uuid>) -> Self {
        let is_super_admin = auth.system_roles.iter().any(|role| role == SUPER_ADMIN);
        let is_org_admin = auth
            .organization_roles
            .iter()
            .any(|role| role == ORGANIZATION_ADMIN);
        let is_system_auditor = auth.system_roles.iter().any(|role| role == SYSTEM_AUDITOR);
        // Audit visibility is global: any membership counts, not only the selected one.
        let is_bu_auditor = auth
            .bu_permissions
            .iter()
            .any(|permission| permission.permission_level == PermissionLevel::Auditor);

        let current_index = selected_bu_id.and_then(|id| {
            auth.bu_permissions
                .iter()
                .position(|permission| permission.business_unit_id == id)
        });
        let current = current_index.and_then(|index| auth.bu_permissions.get(index));

        let capabilities = if is_super_admin || is_org_admin {
            GranularPermissions::all()
        } else {
            match current {
                Some(permission) if permission.permission_level == PermissionLevel::BuAdmin => {
                    GranularPermissions::all()
                }
                Some(permission) => permission.granular_permissions.unwrap_or_default(),
                None => GranularPermissions::default(),
            }
        };

        Self {
            is_super_admin,
            is_org_admin,
            is_system_auditor,
            is_bu_auditor,
            current_index,
            capabilities,
        }
    }
}

/// SessionContext
///
/// Built once per request by the role gate and handed to handlers through request
/// extensions. Cloning is cheap: the snapshot is shared.
/// SessionContext
///
/// One user's auth context plus the BU they have selected. Cheap to clone: the context
/// is shared and the derived predicates are recomputed only when the selection moves.
///
/// `Default` is the unresolved session, where every predicate fails with
/// [`SessionError::OutsideProvider`].
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    auth: Option<Arc<AuthContext>>,
    selected_bu_id: Option<Uuid>,
    derived: Option<Derived>,
}

impl SessionContext {
    /// Wraps a fetched snapshot. The selection defaults to the first BU entry.
    pub fn new(auth: Option<Arc<AuthContext>>) -> Self {
        let selected_bu_id = auth
            .as_ref()
            .and_then(|ctx| ctx.bu_permissions.first())
            .map(|permission| permission.business_unit_id);
        let derived = auth
            .as_deref()
            .map(|ctx| Derived::compute(ctx, selected_bu_id));

        Self {
            auth,
            selected_bu_id,
            derived,
        }
    }

    /// True once a snapshot has been provided.
    pub fn is_resolved(&self) -> bool {
        self.auth.is_some()
    }

    /// The raw snapshot as returned by `get_user_auth_context`.
    pub fn auth_context(&self) -> Result<&AuthContext, SessionError> {
        self.auth.as_deref().ok_or(SessionError::OutsideProvider)
    }

    /// Shared handle to the snapshot, `None` when unresolved.
    pub fn shared_auth_context(&self) -> Option<Arc<AuthContext>> {
        self.auth.clone()
    }

    /// May name a BU the user has no membership in.
    pub fn selected_bu_id(&self) -> Option<Uuid> {
        self.selected_bu_id
    }

    /// Replaces the selection pointer. Unknown ids are accepted; they simply resolve to
    /// no current permission.
    pub fn set_selected_bu_id(&mut self, id: Option<Uuid>) {
        if self.selected_bu_id == id {
            return;
        }
        self.selected_bu_id = id;
        self.derived = self
            .auth
            .as_deref()
            .map(|ctx| Derived::compute(ctx, id));
    }

    /// Returns a copy scoped to `id`. Used by handlers whose BU comes from the path.
    pub fn with_selected_bu(&self, id: Uuid) -> Self {
        let mut scoped = self.clone();
        scoped.set_selected_bu_id(Some(id));
        scoped
    }

    fn derived(&self) -> Result<(&AuthContext, &Derived), SessionError> {
        match (self.auth.as_deref(), self.derived.as_ref()) {
            (Some(auth), Some(derived)) => Ok((auth, derived)),
            _ => Err(SessionError::OutsideProvider),
        }
    }

    /// The membership entry of the selected BU, if the user has one.
    pub fn current_bu_permission(&self) -> Result<Option<&BuPermission>, SessionError> {
        let (auth, derived) = self.derived()?;
        Ok(derived
            .current_index
            .and_then(|index| auth.bu_permissions.get(index)))
    }

    /// Exact, case-sensitive match against `system_roles`.
    pub fn has_system_role(&self, role: &str) -> Result<bool, SessionError> {
        let auth = self.auth_context()?;
        Ok(auth.system_roles.iter().any(|held| held == role))
    }

    pub fn is_super_admin(&self) -> Result<bool, SessionError> {
        Ok(self.derived()?.1.is_super_admin)
    }

    /// True when `organization_roles` holds `Organization Admin`.
    pub fn has_org_admin_role(&self) -> Result<bool, SessionError> {
        Ok(self.derived()?.1.is_org_admin)
    }

    /// has_bu_permission
    ///
    /// Resolution order:
    /// 1. Super Admin or Organization Admin: always granted.
    /// 2. `BU_ADMIN` on the selected BU: always granted.
    /// 3. Otherwise the selected BU's granular flag, `false` when absent or when nothing
    ///    (or an unknown id) is selected.
    pub fn has_bu_permission(&self, capability: Capability) -> Result<bool, SessionError> {
        Ok(self.derived()?.1.capabilities.get(capability))
    }

    /// Holds the system-wide `AUDITOR` role.
    pub fn is_system_auditor(&self) -> Result<bool, SessionError> {
        Ok(self.derived()?.1.is_system_auditor)
    }

    /// Holds `AUDITOR` in any BU, selected or not.
    pub fn is_bu_auditor(&self) -> Result<bool, SessionError> {
        Ok(self.derived()?.1.is_bu_auditor)
    }

    pub fn is_auditor(&self) -> Result<bool, SessionError> {
        let derived = self.derived()?.1;
        Ok(derived.is_system_auditor || derived.is_bu_auditor)
    }

    /// The caller's tier in `business_unit_id`, independent of the current selection.
    pub fn tier_in(&self, business_unit_id: Uuid) -> Result<PermissionTier, SessionError> {
        let (auth, derived) = self.derived()?;
        let level = auth
            .bu_permission(business_unit_id)
            .map(|permission| permission.permission_level);
        Ok(PermissionTier::from_parts(
            derived.is_super_admin,
            derived.is_org_admin,
            level,
        ))
    }

    /// Flattens the derived predicates for `/me/session`.
    pub fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (auth, derived) = self.derived()?;
        let current = derived
            .current_index
            .and_then(|index| auth.bu_permissions.get(index));

        Ok(SessionSnapshot {
            user_id: auth.user_id,
            selected_bu_id: self.selected_bu_id,
            current_permission_level: current.map(|permission| permission.permission_level),
            is_super_admin: derived.is_super_admin,
            is_org_admin: derived.is_org_admin,
            is_system_auditor: derived.is_system_auditor,
            is_bu_auditor: derived.is_bu_auditor,
            is_auditor: derived.is_system_auditor || derived.is_bu_auditor,
            capabilities: derived.capabilities,
        })
    }
}

impl BusinessUnitSink for SessionContext {
    fn current_bu_id(&self) -> Option<Uuid> {
        self.selected_bu_id
    }

    fn select_bu(&mut self, id: Uuid) {
        self.set_selected_bu_id(Some(id));
    }
}

/// Handlers behind a role gate receive the session the gate resolved. Reaching a handler
/// without one means the route was mounted outside every gate.
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<SessionContext>() {
            Some(session) if session.is_resolved() => Ok(session.clone()),
            _ => {
                tracing::error!(
                    uri = %parts.uri,
                    "{}",
                    SessionError::OutsideProvider
                );
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
