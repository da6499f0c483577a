//! Error types for the tenant isolation module.

use thiserror::Error;
use uuid::Uuid;

use crate::models::WriteOperation;

/// A write rejected by the enforcement layer.
///
/// These always reach the caller of the write and are never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IsolationError {
    #[error("{operation} on '{table}' requires a tenant context")]
    TenantContextRequired {
        table: String,
        operation: WriteOperation,
    },

    #[error("reading '{table}' requires a tenant context")]
    ReadContextRequired { table: String },

    /// The row (or the value supplied for it) is not owned by the context tenant.
    /// `row_tenant` is `None` for rows that have no owner yet.
    #[error("{operation} on '{table}' crosses the boundary of tenant {context_tenant}")]
    CrossTenantAccess {
        table: String,
        operation: WriteOperation,
        context_tenant: Uuid,
        row_tenant: Option<Uuid>,
    },

    #[error("update on '{table}' may not change tenant ownership")]
    TenantReassignment {
        table: String,
        from: Option<Uuid>,
        to: Option<Uuid>,
    },

    /// The entity carries a tenant column but its table is not in the registry.
    #[error("table '{table}' is not registered with the isolation layer")]
    UnregisteredTable { table: String },

    #[error("{operation} on '{table}' matched no existing row")]
    RowNotFound {
        table: String,
        operation: WriteOperation,
    },

    #[error("{operation} on '{table}' requires the primary key to be set")]
    MissingPrimaryKey {
        table: String,
        operation: WriteOperation,
    },

    #[error("database error: {0}")]
    Database(String),
}

/// Errors returned by [`crate::TenantIsolationClient`].
#[derive(Debug, Error)]
pub enum TenantIsolationError {
    #[error("unknown migration: {name}")]
    UnknownMigration { name: String },

    #[error("tenant not found: {tenant_id}")]
    TenantNotFound { tenant_id: Uuid },

    /// The tenant registry could not be reached; no tenant was attempted.
    #[error("tenant registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error(transparent)]
    Isolation(#[from] IsolationError),

    #[error("internal error: {0}")]
    Internal(String),
}
