use cascade::models::{
    AuthContext, BuPermission, BuRole, Capability, CreateAccountRequest, GranularPermissions, PermissionLevel,
    SessionSnapshot,
};
use serde_json::json;
use uuid::Uuid;

#[test]
fn test_auth_context_payload_mapping() {
    // Shape returned by `get_user_auth_context`.
    let payload = json!({
        "user_id": "00000000-0000-0000-0000-0000000a11ce",
        "profile": {
            "id": "00000000-0000-0000-0000-0000000a11ce",
            "email": "alice@example.com",
            "first_name": "Alice"
        },
        "system_roles": ["AUDITOR"],
        "organization_roles": [],
        "bu_permissions": [{
            "business_unit_id": "00000000-0000-0000-0000-00000000000a",
            "business_unit_name": "Procurement",
            "permission_level": "BU_ADMIN",
            "role": { "id": null, "name": "Head of Procurement" },
            "granular_permissions": { "can_manage_forms": true }
        }]
    });

    let ctx: AuthContext = serde_json::from_value(payload).unwrap();

    assert_eq!(ctx.user_id, Uuid::from_u128(0xA11CE));
    assert_eq!(ctx.profile.unwrap().last_name, None);
    let permission = &ctx.bu_permissions[0];
    assert_eq!(permission.permission_level, PermissionLevel::BuAdmin);
    assert_eq!(permission.role.as_ref().unwrap().name, "Head of Procurement");

    // Flags missing from the payload default to false.
    let flags = permission.granular_permissions.unwrap();
    assert!(flags.can_manage_forms);
    assert!(!flags.can_manage_workflows);
    assert!(!flags.can_create_accounts);
}

#[test]
fn test_bu_role_accepts_bare_name_or_null() {
    let permission = |role| {
        serde_json::from_value::<BuPermission>(json!({
            "business_unit_id": "00000000-0000-0000-0000-00000000000a",
            "business_unit_name": "Procurement",
            "permission_level": "APPROVER",
            "role": role
        }))
        .unwrap()
    };

    assert_eq!(
        permission(json!("Purchasing Officer")).role,
        Some(BuRole {
            id: None,
            name: "Purchasing Officer".to_string()
        })
    );
    assert_eq!(
        permission(json!({ "id": "00000000-0000-0000-0000-0000000000f1", "name": "Buyer" }))
            .role
            .unwrap()
            .id,
        Some(Uuid::from_u128(0xF1))
    );
    assert_eq!(permission(json!(null)).role, None);
}

#[test]
fn test_bu_role_rejects_other_shapes() {
    let result = serde_json::from_value::<BuPermission>(json!({
        "business_unit_id": "00000000-0000-0000-0000-00000000000a",
        "business_unit_name": "Procurement",
        "permission_level": "APPROVER",
        "role": 42
    }));

    assert!(result.is_err());
}

#[test]
fn test_auth_context_tolerates_missing_lists() {
    let ctx: AuthContext = serde_json::from_value(json!({
        "user_id": "00000000-0000-0000-0000-0000000a11ce"
    }))
    .unwrap();

    assert!(ctx.profile.is_none());
    assert!(ctx.system_roles.is_empty());
    assert!(ctx.bu_permissions.is_empty());
}

#[test]
fn test_permission_levels_are_screaming_snake_case() {
    let levels = [
        (PermissionLevel::BuAdmin, "BU_ADMIN"),
        (PermissionLevel::Approver, "APPROVER"),
        (PermissionLevel::Member, "MEMBER"),
        (PermissionLevel::Auditor, "AUDITOR"),
    ];
    for (level, text) in levels {
        assert_eq!(serde_json::to_value(level).unwrap(), json!(text));
    }
    assert!(serde_json::from_value::<PermissionLevel>(json!("bu_admin")).is_err());
}

#[test]
fn test_capability_names_match_flag_keys() {
    let flags = serde_json::to_value(GranularPermissions::default()).unwrap();
    let keys = flags.as_object().unwrap();

    for capability in Capability::ALL {
        let name = serde_json::to_value(capability).unwrap();
        let name = name.as_str().unwrap();
        assert!(keys.contains_key(name), "{name}");
        assert!(GranularPermissions::all().get(capability));
        assert!(!GranularPermissions::default().get(capability));
    }
    assert_eq!(keys.len(), Capability::ALL.len());
}

#[test]
fn test_create_account_request_defaults_to_member() {
    let request: CreateAccountRequest = serde_json::from_value(json!({
        "email": "new@example.com",
        "password": "hunter22"
    }))
    .unwrap();

    assert_eq!(request.permission_level, PermissionLevel::Member);
}

#[test]
fn test_dedup_keeps_first_entry() {
    let mut ctx: AuthContext = serde_json::from_value(json!({
        "user_id": "00000000-0000-0000-0000-0000000a11ce",
        "bu_permissions": [
            { "business_unit_id": "00000000-0000-0000-0000-00000000000a", "business_unit_name": "A", "permission_level": "MEMBER" },
            { "business_unit_id": "00000000-0000-0000-0000-00000000000b", "business_unit_name": "B", "permission_level": "AUDITOR" },
            { "business_unit_id": "00000000-0000-0000-0000-00000000000a", "business_unit_name": "A", "permission_level": "BU_ADMIN" }
        ]
    }))
    .unwrap();

    assert_eq!(ctx.dedup_bu_permissions(), 1);
    assert_eq!(ctx.bu_permissions.len(), 2);
    assert_eq!(
        ctx.bu_permission(Uuid::from_u128(0xA)).unwrap().permission_level,
        PermissionLevel::Member
    );
}

#[test]
fn test_session_snapshot_json_shape() {
    let snapshot = SessionSnapshot {
        user_id: Uuid::from_u128(1),
        selected_bu_id: None,
        current_permission_level: None,
        is_super_admin: true,
        is_org_admin: false,
        is_system_auditor: false,
        is_bu_auditor: false,
        is_auditor: false,
        capabilities: GranularPermissions::all(),
    };

    let json_output = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json_output["selected_bu_id"], json!(null));
    assert_eq!(json_output["capabilities"]["can_reset_passwords"], json!(true));
}
