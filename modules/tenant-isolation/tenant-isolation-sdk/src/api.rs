//! Public API trait for the tenant isolation module.

use async_trait::async_trait;

use crate::error::TenantIsolationError;
use crate::models::{
    BatchResult, IntegrityIssue, MigrationRecord, TenantId, TenantOutcome, ViolationSummary,
};

/// Operator-facing operations: migrations across tenants, integrity sweeps,
/// and violation reporting.
///
/// Batch methods only return `Err` for setup failures (unknown migration name,
/// registry unreachable). Per-tenant failures are reported inside the
/// [`BatchResult`]; a non-zero `summary().failed` means the batch is incomplete.
///
/// ```ignore
/// let result = client.run_on_all_tenants("AddTenantIdColumns").await?;
/// if !result.is_complete() {
///     for failed in result.failed() {
///         eprintln!("{}: {:?}", failed.tenant_id, failed.error);
///     }
/// }
/// ```
#[async_trait]
pub trait TenantIsolationClient: Send + Sync {
    /// Apply one migration to one tenant.
    ///
    /// # Errors
    /// `UnknownMigration` or `TenantNotFound`. A failed attempt is an `Ok`
    /// outcome with `success = false`.
    async fn run_on_tenant(
        &self,
        tenant_id: TenantId,
        migration: &str,
    ) -> Result<TenantOutcome, TenantIsolationError>;

    /// Apply one migration to every active tenant.
    ///
    /// # Errors
    /// `UnknownMigration` or `RegistryUnavailable`.
    async fn run_on_all_tenants(&self, migration: &str)
    -> Result<BatchResult, TenantIsolationError>;

    /// Reverse one migration on every active tenant.
    ///
    /// # Errors
    /// `UnknownMigration` or `RegistryUnavailable`.
    async fn rollback_on_all_tenants(
        &self,
        migration: &str,
    ) -> Result<BatchResult, TenantIsolationError>;

    /// Apply migrations in the given order, each across all active tenants.
    ///
    /// # Errors
    /// `UnknownMigration` or `RegistryUnavailable`.
    async fn run_batch(&self, migrations: &[String]) -> Result<BatchResult, TenantIsolationError>;

    /// Reverse migrations in reverse order, each across all active tenants.
    ///
    /// # Errors
    /// `UnknownMigration` or `RegistryUnavailable`.
    async fn rollback_batch(
        &self,
        migrations: &[String],
    ) -> Result<BatchResult, TenantIsolationError>;

    /// Ledger records, newest first, optionally for one migration.
    ///
    /// # Errors
    /// `Internal` if the ledger cannot be read.
    async fn migration_status(
        &self,
        migration: Option<&str>,
    ) -> Result<Vec<MigrationRecord>, TenantIsolationError>;

    /// Read-only integrity sweep of one tenant's store.
    ///
    /// # Errors
    /// `TenantNotFound` or `Internal` when the store cannot be queried.
    async fn validate_tenant_integrity(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<IntegrityIssue>, TenantIsolationError>;

    /// Violation counts over the last `window_days` days.
    ///
    /// # Errors
    /// `Internal` if the violation log cannot be read.
    async fn summarize_violations(
        &self,
        window_days: u32,
    ) -> Result<Vec<ViolationSummary>, TenantIsolationError>;
}
