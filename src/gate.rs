//! Role gates for route trees.
//!
//! A gate resolves the caller's session once per request and either lets the request
//! through (with the session attached) or redirects it. Gates improve navigation only;
//! every mutating handler still checks its own capability, and the stored procedures
//! enforce access on their side.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    AppState,
    auth::fetch_auth_context,
    session::{SUPER_ADMIN, SessionContext, SessionError},
};

/// Where unauthenticated visitors are sent.
pub const LOGIN_PATH: &str = "/auth/login";
/// Where authenticated visitors lacking a role are sent.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// The predicate a route tree requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRequirement {
    Authenticated,
    SuperAdmin,
    OrganizationAdmin,
    Auditor,
}

impl GateRequirement {
    pub fn is_satisfied_by(self, session: &SessionContext) -> Result<bool, SessionError> {
        match self {
            GateRequirement::Authenticated => session.auth_context().map(|_| true),
            GateRequirement::SuperAdmin => session.has_system_role(SUPER_ADMIN),
            GateRequirement::OrganizationAdmin => session.has_org_admin_role(),
            GateRequirement::Auditor => session.is_auditor(),
        }
    }

    pub const fn default_fallback(self) -> &'static str {
        match self {
            GateRequirement::Authenticated => LOGIN_PATH,
            _ => DASHBOARD_PATH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleGate {
    pub requirement: GateRequirement,
    pub fallback: &'static str,
}

impl RoleGate {
    pub const fn new(requirement: GateRequirement) -> Self {
        Self {
            requirement,
            fallback: requirement.default_fallback(),
        }
    }
}

/// GateState
///
/// `Loading` until the session is resolved, then `Authorized` or `Unauthorized`. The
/// resolved states are terminal: a role revoked mid-request is not re-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Loading,
    Authorized,
    Unauthorized { redirect_to: &'static str },
}

impl GateState {
    pub fn resolve(self, session: &SessionContext, gate: &RoleGate) -> Self {
        if self != GateState::Loading {
            return self;
        }
        if !session.is_resolved() {
            return GateState::Unauthorized {
                redirect_to: LOGIN_PATH,
            };
        }
        match gate.requirement.is_satisfied_by(session) {
            Ok(true) => GateState::Authorized,
            Ok(false) => GateState::Unauthorized {
                redirect_to: gate.fallback,
            },
            Err(_) => GateState::Unauthorized {
                redirect_to: LOGIN_PATH,
            },
        }
    }

    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            GateState::Unauthorized { redirect_to } => Some(*redirect_to),
            _ => None,
        }
    }
}

/// State handed to `role_gate`: the application services plus the gate of this tree.
#[derive(Clone)]
pub struct GateLayer {
    pub app: AppState,
    pub gate: RoleGate,
}

impl GateLayer {
    pub fn new(app: AppState, requirement: GateRequirement) -> Self {
        Self {
            app,
            gate: RoleGate::new(requirement),
        }
    }
}

/// role_gate
///
/// Middleware for a gated route tree. Fetches the auth context once, resolves the gate
/// and, when authorized, attaches the `SessionContext` for the handlers below.
pub async fn role_gate(State(layer): State<GateLayer>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let context = fetch_auth_context(&mut parts, &layer.app).await;
    let session = SessionContext::new(context.map(Arc::new));

    match GateState::Loading.resolve(&session, &layer.gate) {
        GateState::Authorized => {
            parts.extensions.insert(session);
            next.run(Request::from_parts(parts, body)).await
        }
        state => {
            let redirect_to = state.redirect_target().unwrap_or(LOGIN_PATH);
            tracing::info!(
                uri = %parts.uri,
                requirement = ?layer.gate.requirement,
                redirect_to,
                "role gate denied request"
            );
            Redirect::to(redirect_to).into_response()
        }
    }
}
