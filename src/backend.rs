use crate::models::{AuthContext, BusinessUnitMember, BusinessUnitOption, PermissionLevel};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// BackendError
///
/// Failure of a stored-procedure call. Handlers log it and answer with a generic status;
/// the message never reaches the client.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database call failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unexpected RPC payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Backend Trait
///
/// The backend's RPC surface. Every method is a single call to a named stored procedure
/// executed on behalf of `user_id`; authorization filtering and workflow stepping happen
/// inside the procedures. Payloads the gateway does not interpret stay as JSON.
#[async_trait]
pub trait Backend: Send + Sync {
    // --- Authorization ---
    // `Ok(None)` when the procedure knows no such user.
    async fn get_user_auth_context(&self, user_id: Uuid)
    -> Result<Option<AuthContext>, BackendError>;

    // --- Business Units ---
    async fn get_business_units_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BusinessUnitOption>, BackendError>;
    async fn get_business_units_for_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<BusinessUnitOption>, BackendError>;
    async fn add_business_unit_member(
        &self,
        user_id: Uuid,
        business_unit_id: Uuid,
        member_id: Uuid,
        level: PermissionLevel,
    ) -> Result<(), BackendError>;
    // `Ok(None)` when `member_id` is not a member of the BU.
    async fn get_business_unit_member(
        &self,
        user_id: Uuid,
        business_unit_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<BusinessUnitMember>, BackendError>;

    // --- Requests & Workflow ---
    async fn get_auditor_requests(&self, user_id: Uuid) -> Result<Value, BackendError>;
    // `Ok(None)` when the request does not exist or is not visible to the caller.
    async fn get_request_workflow_progress(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<Value>, BackendError>;
    async fn trigger_next_section(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<Value, BackendError>;
}

/// BackendState
///
/// The type used to share the backend across the application state.
pub type BackendState = Arc<dyn Backend>;

/// PostgresBackend
///
/// Calls the stored procedures directly over a Postgres pool. Procedures written against
/// Supabase read the caller through `auth.uid()`, which reads `request.jwt.claims`; each
/// call therefore runs in its own transaction with those claims set locally.
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// rpc
    ///
    /// Runs `sql` (which must select a single `jsonb` value, bound to at most `$1..$n` from
    /// `args`) as `user_id`. A SQL `NULL` result maps to `None`.
    async fn rpc(
        &self,
        user_id: Uuid,
        sql: &str,
        args: &[RpcArg],
    ) -> Result<Option<Value>, BackendError> {
        let claims = json!({ "sub": user_id, "role": "authenticated" }).to_string();

        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('request.jwt.claims', $1, true)")
            .bind(claims)
            .execute(&mut *tx)
            .await?;

        let mut query = sqlx::query_scalar::<_, Option<Value>>(sql);
        for arg in args {
            query = match arg {
                RpcArg::Id(id) => query.bind(*id),
                RpcArg::Text(text) => query.bind(text.clone()),
            };
        }
        let value = query.fetch_one(&mut *tx).await?;
        tx.commit().await?;

        Ok(value)
    }

    async fn rpc_as<T: DeserializeOwned>(
        &self,
        user_id: Uuid,
        sql: &str,
        args: &[RpcArg],
    ) -> Result<Option<T>, BackendError> {
        match self.rpc(user_id, sql, args).await? {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }
}

enum RpcArg {
    Id(Uuid),
    Text(String),
}

fn permission_level_literal(level: PermissionLevel) -> &'static str {
    match level {
        PermissionLevel::BuAdmin => "BU_ADMIN",
        PermissionLevel::Approver => "APPROVER",
        PermissionLevel::Member => "MEMBER",
        PermissionLevel::Auditor => "AUDITOR",
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    async fn get_user_auth_context(
        &self,
        user_id: Uuid,
    ) -> Result<Option<AuthContext>, BackendError> {
        self.rpc_as(
            user_id,
            "SELECT to_jsonb(public.get_user_auth_context())",
            &[],
        )
        .await
        .inspect_err(|e| tracing::error!("get_user_auth_context error: {:?}", e))
    }

    async fn get_business_units_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BusinessUnitOption>, BackendError> {
        let units: Option<Vec<BusinessUnitOption>> = self
            .rpc_as(
                user_id,
                "SELECT COALESCE(jsonb_agg(to_jsonb(bu)), '[]'::jsonb) \
                 FROM public.get_business_units_for_user() bu",
                &[],
            )
            .await
            .inspect_err(|e| tracing::error!("get_business_units_for_user error: {:?}", e))?;
        Ok(units.unwrap_or_default())
    }

    async fn get_business_units_for_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<BusinessUnitOption>, BackendError> {
        let units: Option<Vec<BusinessUnitOption>> = self
            .rpc_as(
                user_id,
                "SELECT COALESCE(jsonb_agg(to_jsonb(bu)), '[]'::jsonb) \
                 FROM public.get_business_units_for_organization(p_organization_id => $1) bu",
                &[RpcArg::Id(organization_id)],
            )
            .await
            .inspect_err(|e| {
                tracing::error!("get_business_units_for_organization error: {:?}", e)
            })?;
        Ok(units.unwrap_or_default())
    }

    async fn add_business_unit_member(
        &self,
        user_id: Uuid,
        business_unit_id: Uuid,
        member_id: Uuid,
        level: PermissionLevel,
    ) -> Result<(), BackendError> {
        self.rpc(
            user_id,
            "SELECT to_jsonb(public.add_business_unit_member(\
                p_business_unit_id => $1, p_user_id => $2, p_permission_level => $3))",
            &[
                RpcArg::Id(business_unit_id),
                RpcArg::Id(member_id),
                RpcArg::Text(permission_level_literal(level).to_string()),
            ],
        )
        .await
        .inspect_err(|e| tracing::error!("add_business_unit_member error: {:?}", e))?;
        Ok(())
    }

    async fn get_business_unit_member(
        &self,
        user_id: Uuid,
        business_unit_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<BusinessUnitMember>, BackendError> {
        self.rpc_as(
            user_id,
            "SELECT to_jsonb(public.get_business_unit_member(\
                p_business_unit_id => $1, p_user_id => $2))",
            &[RpcArg::Id(business_unit_id), RpcArg::Id(member_id)],
        )
        .await
        .inspect_err(|e| tracing::error!("get_business_unit_member error: {:?}", e))
    }

    async fn get_auditor_requests(&self, user_id: Uuid) -> Result<Value, BackendError> {
        let requests = self
            .rpc(
                user_id,
                "SELECT COALESCE(jsonb_agg(to_jsonb(r)), '[]'::jsonb) \
                 FROM public.get_auditor_requests() r",
                &[],
            )
            .await
            .inspect_err(|e| tracing::error!("get_auditor_requests error: {:?}", e))?;
        Ok(requests.unwrap_or_else(|| Value::Array(vec![])))
    }

    async fn get_request_workflow_progress(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<Value>, BackendError> {
        let progress = self
            .rpc(
                user_id,
                "SELECT to_jsonb(public.get_request_workflow_progress(p_request_id => $1))",
                &[RpcArg::Id(request_id)],
            )
            .await
            .inspect_err(|e| tracing::error!("get_request_workflow_progress error: {:?}", e))?;
        Ok(progress.filter(|value| !value.is_null()))
    }

    async fn trigger_next_section(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<Value, BackendError> {
        let result = self
            .rpc(
                user_id,
                "SELECT to_jsonb(public.trigger_next_section(p_request_id => $1))",
                &[RpcArg::Id(request_id)],
            )
            .await
            .inspect_err(|e| tracing::error!("trigger_next_section error: {:?}", e))?;
        Ok(result.unwrap_or(Value::Null))
    }
}
