//! Tenant registry port.
//!
//! Tenant metadata is owned elsewhere; this module only needs to list tenants
//! and reach each tenant's data store.

use async_trait::async_trait;
use coopkit_db::DbHandle;
use tenant_isolation_sdk::{TenantFilter, TenantId, TenantInfo};

use crate::domain::error::RegistryError;

#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Tenants matching `filter`, in a stable order.
    async fn list_tenants(&self, filter: &TenantFilter) -> Result<Vec<TenantInfo>, RegistryError>;

    /// Pooled handle to the tenant's data store.
    ///
    /// Returns [`RegistryError::TenantNotFound`] for unknown tenants and
    /// [`RegistryError::Connection`] when the store cannot be reached.
    async fn connection(&self, tenant_id: TenantId) -> Result<DbHandle, RegistryError>;
}
