//! Domain error types for the tenant isolation module.

use sea_orm::DbErr;
use tenant_isolation_sdk::{IsolationError, TenantId, TenantIsolationError};
use thiserror::Error;

use crate::domain::tables::TableRegistryError;

/// Failures of the tenant registry port.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),

    /// The registry itself could not be queried.
    #[error("tenant registry unavailable: {0}")]
    Unavailable(String),

    /// The tenant is known but its data store could not be reached.
    #[error("cannot connect to store of tenant {tenant_id}: {message}")]
    Connection { tenant_id: TenantId, message: String },
}

/// Failures of a violation sink. Never escapes the auditor's `record`.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("violation store error: {0}")]
    Store(#[from] DbErr),

    #[error("corrupt violation row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown migration: {0}")]
    UnknownMigration(String),

    #[error("migration '{0}' registered twice")]
    DuplicateMigration(String),

    #[error(transparent)]
    Tables(#[from] TableRegistryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Isolation(#[from] IsolationError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("migration ledger error: {0}")]
    Ledger(#[source] DbErr),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl From<DomainError> for TenantIsolationError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::UnknownMigration(name) => Self::UnknownMigration { name },
            DomainError::Registry(RegistryError::TenantNotFound(tenant_id)) => {
                Self::TenantNotFound { tenant_id }
            }
            DomainError::Registry(e @ (RegistryError::Unavailable(_) | RegistryError::Connection { .. })) => {
                Self::RegistryUnavailable(e.to_string())
            }
            DomainError::Isolation(e) => Self::Isolation(e),
            other @ (DomainError::DuplicateMigration(_)
            | DomainError::Tables(_)
            | DomainError::Audit(_)
            | DomainError::Ledger(_)
            | DomainError::Database(_)) => Self::Internal(other.to_string()),
        }
    }
}
