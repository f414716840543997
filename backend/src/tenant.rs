//! Tenant scoping
//!
//! Every store, ledger and transfer operation takes a [`TenantScope`] as its
//! first argument. A scope can only be obtained from an authenticated request
//! or through [`TenantScope::bind`]; there is no unscoped way to reach the
//! data.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;

/// Tenant and acting user bound to one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: Uuid,
    user_id: Uuid,
}

impl TenantScope {
    /// Bind a scope. Nil identifiers mean the caller never resolved a tenant.
    pub fn bind(tenant_id: Uuid, user_id: Uuid) -> AppResult<Self> {
        if tenant_id.is_nil() || user_id.is_nil() {
            return Err(AppError::TenantContextMissing);
        }
        Ok(Self { tenant_id, user_id })
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// Acting user, recorded as creator/dispatcher/receiver
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

impl TryFrom<&AuthUser> for TenantScope {
    type Error = AppError;

    fn try_from(user: &AuthUser) -> AppResult<Self> {
        TenantScope::bind(user.tenant_id, user.user_id)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for TenantScope
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts.extensions.get::<AuthUser>().ok_or_else(|| {
            tracing::error!(path = %parts.uri.path(), "Tenant scope requested on a route without authentication");
            AppError::TenantContextMissing
        })?;
        TenantScope::try_from(user)
    }
}
