use serde::Serialize;
use uuid::Uuid;

use crate::system::SystemOperation;

/// Stable tenant identifier.
pub type TenantId = Uuid;

/// The tenant a single unit of work is acting for.
///
/// A `TenantContext` is a plain value. Whoever owns the unit of work owns the
/// context; it is never published to a shared location (static, thread-local,
/// or database session variable), so concurrent units of work on the same pool
/// cannot observe or overwrite each other's tenant.
///
/// ```
/// use coopkit_security::TenantContext;
/// use uuid::Uuid;
///
/// let tenant = Uuid::new_v4();
/// let mut ctx = TenantContext::default();
/// assert!(ctx.get().is_none());
///
/// ctx.set(tenant);
/// assert_eq!(ctx.get(), Some(tenant));
///
/// ctx.clear();
/// assert!(ctx.is_absent());
/// ```
///
/// Administrative mode is reachable only through [`SystemOperation::begin`];
/// a context cannot be read back from serialized input:
///
/// ```compile_fail
/// let ctx: coopkit_security::TenantContext =
///     serde_json::from_str(r#"{"mode":"absent"}"#).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TenantContext {
    /// No tenant has been set for this unit of work.
    #[default]
    Absent,
    /// Acting on behalf of exactly one tenant.
    Tenant { tenant_id: TenantId },
    /// Explicit, audited administrative mode.
    System { operation: SystemOperation },
}

impl TenantContext {
    #[must_use]
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self::Tenant { tenant_id }
    }

    #[must_use]
    pub fn system(operation: SystemOperation) -> Self {
        Self::System { operation }
    }

    /// Bind this context to `tenant_id`, replacing whatever was set before.
    pub fn set(&mut self, tenant_id: TenantId) {
        *self = Self::Tenant { tenant_id };
    }

    /// Current tenant, if the context is tenant-bound.
    #[must_use]
    pub fn get(&self) -> Option<TenantId> {
        match self {
            Self::Tenant { tenant_id } => Some(*tenant_id),
            Self::Absent | Self::System { .. } => None,
        }
    }

    /// Reset to [`TenantContext::Absent`].
    pub fn clear(&mut self) {
        if let Self::System { operation } = self {
            tracing::info!(
                target: "security",
                operation_id = %operation.id(),
                reason = operation.reason(),
                "system operation context cleared"
            );
        }
        *self = Self::Absent;
    }

    /// Switch to administrative mode for the remainder of the unit of work.
    pub fn enter_system(&mut self, operation: SystemOperation) {
        *self = Self::System { operation };
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System { .. })
    }

    #[must_use]
    pub fn system_operation(&self) -> Option<&SystemOperation> {
        match self {
            Self::System { operation } => Some(operation),
            Self::Absent | Self::Tenant { .. } => None,
        }
    }
}
