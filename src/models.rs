use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Authorization Snapshot (returned by `get_user_auth_context`) ---

/// AuthContext
///
/// The normalized permissions snapshot of the caller. One is fetched per request by the
/// root gate and handed down by `Arc`; it is never mutated after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AuthContext {
    pub user_id: Uuid,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub system_roles: Vec<String>,
    #[serde(default)]
    pub organization_roles: Vec<String>,
    #[serde(default)]
    pub bu_permissions: Vec<BuPermission>,
}

impl AuthContext {
    /// Enforces "at most one entry per business unit". The first entry wins.
    /// Returns the number of dropped duplicates.
    pub fn dedup_bu_permissions(&mut self) -> usize {
        let before = self.bu_permissions.len();
        let mut seen = HashSet::with_capacity(before);
        self.bu_permissions
            .retain(|permission| seen.insert(permission.business_unit_id));
        before - self.bu_permissions.len()
    }

    pub fn bu_permission(&self, business_unit_id: Uuid) -> Option<&BuPermission> {
        self.bu_permissions
            .iter()
            .find(|permission| permission.business_unit_id == business_unit_id)
    }
}

/// Profile
///
/// The `public.profiles` row joined into the auth context. Every column is optional
/// because older rows predate the name fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// BuPermission
///
/// One business-unit membership of the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BuPermission {
    pub business_unit_id: Uuid,
    pub business_unit_name: String,
    pub permission_level: PermissionLevel,
    /// Accepts either `{ "id", "name" }` or a bare role name.
    #[serde(default, deserialize_with = "deserialize_bu_role")]
    pub role: Option<BuRole>,
    #[serde(default)]
    pub granular_permissions: Option<GranularPermissions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PermissionLevel {
    BuAdmin,
    Approver,
    Member,
    Auditor,
}

/// BuRole
///
/// The named BU role the membership was granted through (e.g. "Purchasing Officer").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BuRole {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BuRolePayload {
    Named(BuRole),
    Bare(String),
}

/// Older versions of `get_user_auth_context` send the role as its name only.
fn deserialize_bu_role<'de, D>(deserializer: D) -> Result<Option<BuRole>, D::Error>
where
    D: Deserializer<'de>,
{
    let payload = Option::<BuRolePayload>::deserialize(deserializer)?;
    Ok(payload.map(|role| match role {
        BuRolePayload::Named(role) => role,
        BuRolePayload::Bare(name) => BuRole { id: None, name },
    }))
}

/// GranularPermissions
///
/// The fixed set of per-BU capability flags. Flags missing from the payload are `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GranularPermissions {
    #[serde(default)]
    pub can_manage_employee_roles: bool,
    #[serde(default)]
    pub can_manage_bu_roles: bool,
    #[serde(default)]
    pub can_create_accounts: bool,
    #[serde(default)]
    pub can_reset_passwords: bool,
    #[serde(default)]
    pub can_manage_forms: bool,
    #[serde(default)]
    pub can_manage_workflows: bool,
}

impl GranularPermissions {
    /// Every flag set. This is the effective set of an admin tier.
    pub const fn all() -> Self {
        Self {
            can_manage_employee_roles: true,
            can_manage_bu_roles: true,
            can_create_accounts: true,
            can_reset_passwords: true,
            can_manage_forms: true,
            can_manage_workflows: true,
        }
    }

    pub const fn get(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageEmployeeRoles => self.can_manage_employee_roles,
            Capability::ManageBuRoles => self.can_manage_bu_roles,
            Capability::CreateAccounts => self.can_create_accounts,
            Capability::ResetPasswords => self.can_reset_passwords,
            Capability::ManageForms => self.can_manage_forms,
            Capability::ManageWorkflows => self.can_manage_workflows,
        }
    }
}

/// Capability
///
/// Closed set of granular capability keys. The serialized names match the flag names of
/// `GranularPermissions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Capability {
    #[serde(rename = "can_manage_employee_roles")]
    ManageEmployeeRoles,
    #[serde(rename = "can_manage_bu_roles")]
    ManageBuRoles,
    #[serde(rename = "can_create_accounts")]
    CreateAccounts,
    #[serde(rename = "can_reset_passwords")]
    ResetPasswords,
    #[serde(rename = "can_manage_forms")]
    ManageForms,
    #[serde(rename = "can_manage_workflows")]
    ManageWorkflows,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ManageEmployeeRoles,
        Capability::ManageBuRoles,
        Capability::CreateAccounts,
        Capability::ResetPasswords,
        Capability::ManageForms,
        Capability::ManageWorkflows,
    ];
}

/// BusinessUnitMember
///
/// What `get_business_unit_member` reports about a target user: their level in the BU
/// and whether they hold an admin tier elsewhere. `None` at the RPC level means the user
/// is not a member of that BU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BusinessUnitMember {
    pub user_id: Uuid,
    pub business_unit_id: Uuid,
    pub permission_level: PermissionLevel,
    #[serde(default)]
    pub is_super_admin: bool,
    #[serde(default)]
    pub is_org_admin: bool,
}

// --- Derived Views ---

/// SessionSnapshot
///
/// Every derived predicate of a session for its current BU selection (GET /me/session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionSnapshot {
    pub user_id: Uuid,
    pub selected_bu_id: Option<Uuid>,
    pub current_permission_level: Option<PermissionLevel>,
    pub is_super_admin: bool,
    pub is_org_admin: bool,
    pub is_system_auditor: bool,
    pub is_bu_auditor: bool,
    pub is_auditor: bool,
    /// Effective capabilities for the selected BU, after admin overrides.
    pub capabilities: GranularPermissions,
}

/// BusinessUnitOption
///
/// One row of `get_business_units_for_user` / `get_business_units_for_organization`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BusinessUnitOption {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
}

/// BusinessUnitSelectorView
///
/// What the BU dropdown renders. `visible` is false when there is nothing to choose from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BusinessUnitSelectorView {
    pub visible: bool,
    pub selected_bu_id: Option<Uuid>,
    pub options: Vec<BusinessUnitOption>,
}

/// PublicConfig
///
/// Runtime settings the frontend may read without a session.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PublicConfig {
    pub support_url: String,
}

// --- Attachments ---

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived attachment upload URL (POST /attachments/presigned).
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "quotation.pdf")]
    pub filename: String,
    /// The MIME type the upload is constrained to.
    #[schema(example = "application/pdf")]
    pub file_type: String,
    /// Request the attachment belongs to; scopes the object key.
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// The object key to store alongside the attachment record.
    pub resource_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct AttachmentKeyRequest {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct DownloadUrlResponse {
    pub url: String,
}

// --- Account Management ---

/// CreateAccountRequest
///
/// Input payload for creating an employee account inside a BU. The password is forwarded
/// to the Auth provider and never persisted or logged here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_member_level")]
    pub permission_level: PermissionLevel,
}

fn default_member_level() -> PermissionLevel {
    PermissionLevel::Member
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatedAccount {
    pub user_id: Uuid,
    pub email: String,
    pub business_unit_id: Uuid,
    pub permission_level: PermissionLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub new_password: String,
}
