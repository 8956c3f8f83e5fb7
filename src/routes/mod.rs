/// Router Module Index
///
/// Each module is one route tree. Every tree except `public` is wrapped in its own role
/// gate in `create_router`, so a handler never runs for a caller the tree does not admit.

/// Routes reachable without a session.
pub mod public;

/// Routes for any signed-in user (`GateRequirement::Authenticated`).
pub mod authenticated;

/// Routes restricted to the `Super Admin` system role.
pub mod admin;

/// Routes restricted to organization admins.
pub mod organization;

/// Routes restricted to auditors (system or BU-level).
pub mod auditor;
