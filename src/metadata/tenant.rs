//! Tenant scoping of metadata queries.
//!
//! The identity context is populated by an authenticating layer in front
//! of this crate.  Its claims are taken verbatim: nothing here decides
//! whether a caller *should* be an administrator, it only turns the claims
//! it is handed into a scoping predicate.

use std::collections::HashMap;

use super::pipeline::{Filter, Stage};
use crate::errors::ContextError;

/// Claim carrying the caller's tenant id.
pub const CTX_KEY_TENANT_ID: &str = "tenantid";
/// Claim marking the caller as privileged.
pub const CTX_KEY_IS_ADMIN: &str = "isadmin";
/// Value of [`CTX_KEY_IS_ADMIN`] that grants privilege.
pub const CTX_VAL_TRUE: &str = "true";

/// Document field the tenant predicate matches on.
pub const TENANT_FIELD: &str = "tenant_id";

/// Opaque, externally validated claims accompanying a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    claims: HashMap<String, String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context of a caller belonging to `tenant_id`.
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self::new().with_claim(CTX_KEY_TENANT_ID, tenant_id)
    }

    /// Context of a privileged caller.
    pub fn admin() -> Self {
        Self::new().with_claim(CTX_KEY_IS_ADMIN, CTX_VAL_TRUE)
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }

    pub fn claim(&self, key: &str) -> Option<&str> {
        self.claims.get(key).map(String::as_str)
    }
}

/// How a query must be restricted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// Privileged caller: every document is visible.
    Unscoped,
    /// Only documents of this tenant are visible.
    Tenant(String),
}

impl TenantScope {
    /// Derive the scope from a call context.
    ///
    /// Fails when there is no context, or when the caller is not
    /// privileged and names no tenant.
    pub fn from_context(ctx: Option<&CallContext>) -> Result<Self, ContextError> {
        let ctx = ctx.ok_or(ContextError::MissingContext)?;

        if ctx.claim(CTX_KEY_IS_ADMIN) == Some(CTX_VAL_TRUE) {
            return Ok(TenantScope::Unscoped);
        }

        match ctx.claim(CTX_KEY_TENANT_ID) {
            Some(tenant) if !tenant.is_empty() => Ok(TenantScope::Tenant(tenant.to_string())),
            _ => Err(ContextError::MissingTenant),
        }
    }

    /// Conjoin the tenant predicate with a caller-supplied pipeline.
    ///
    /// The predicate runs first so later stages only ever see the
    /// tenant's own documents.
    pub fn apply(&self, stages: Vec<Stage>) -> Vec<Stage> {
        match self {
            TenantScope::Unscoped => stages,
            TenantScope::Tenant(tenant) => {
                let mut scoped = Vec::with_capacity(stages.len() + 1);
                scoped.push(Stage::Match(Filter::eq(TENANT_FIELD, tenant.as_str())));
                scoped.extend(stages);
                scoped
            }
        }
    }
}
