//! Local (in-process) client for the tenant isolation module.

use std::sync::Arc;

use async_trait::async_trait;
use tenant_isolation_sdk::{
    BatchResult, IntegrityIssue, MigrationRecord, TenantId, TenantIsolationClient,
    TenantIsolationError, TenantOutcome, ViolationSummary,
};

use super::auditor::ViolationAuditor;
use super::error::DomainError;
use super::orchestrator::MigrationOrchestrator;
use super::validator::IntegrityValidator;

/// Local client over the orchestrator, validator and auditor.
///
/// Built by [`TenantIsolationModule`](crate::module::TenantIsolationModule).
pub struct TenantIsolationLocalClient {
    orchestrator: Arc<MigrationOrchestrator>,
    validator: Arc<IntegrityValidator>,
    auditor: Arc<ViolationAuditor>,
}

impl TenantIsolationLocalClient {
    #[must_use]
    pub fn new(
        orchestrator: Arc<MigrationOrchestrator>,
        validator: Arc<IntegrityValidator>,
        auditor: Arc<ViolationAuditor>,
    ) -> Self {
        Self {
            orchestrator,
            validator,
            auditor,
        }
    }
}

fn log_and_convert(op: &str, e: DomainError) -> TenantIsolationError {
    tracing::error!(operation = op, error = ?e, "tenant-isolation call failed");
    e.into()
}

#[async_trait]
impl TenantIsolationClient for TenantIsolationLocalClient {
    async fn run_on_tenant(
        &self,
        tenant_id: TenantId,
        migration: &str,
    ) -> Result<TenantOutcome, TenantIsolationError> {
        self.orchestrator
            .run_on_tenant(tenant_id, migration)
            .await
            .map_err(|e| log_and_convert("run_on_tenant", e))
    }

    async fn run_on_all_tenants(
        &self,
        migration: &str,
    ) -> Result<BatchResult, TenantIsolationError> {
        self.orchestrator
            .run_on_all_tenants(migration)
            .await
            .map_err(|e| log_and_convert("run_on_all_tenants", e))
    }

    async fn rollback_on_all_tenants(
        &self,
        migration: &str,
    ) -> Result<BatchResult, TenantIsolationError> {
        self.orchestrator
            .rollback_on_all_tenants(migration)
            .await
            .map_err(|e| log_and_convert("rollback_on_all_tenants", e))
    }

    async fn run_batch(&self, migrations: &[String]) -> Result<BatchResult, TenantIsolationError> {
        self.orchestrator
            .run_batch(migrations)
            .await
            .map_err(|e| log_and_convert("run_batch", e))
    }

    async fn rollback_batch(
        &self,
        migrations: &[String],
    ) -> Result<BatchResult, TenantIsolationError> {
        self.orchestrator
            .rollback_batch(migrations)
            .await
            .map_err(|e| log_and_convert("rollback_batch", e))
    }

    async fn migration_status(
        &self,
        migration: Option<&str>,
    ) -> Result<Vec<MigrationRecord>, TenantIsolationError> {
        self.orchestrator
            .migration_status(migration)
            .await
            .map_err(|e| log_and_convert("migration_status", e))
    }

    async fn validate_tenant_integrity(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<IntegrityIssue>, TenantIsolationError> {
        self.validator
            .validate_tenant_integrity(tenant_id)
            .await
            .map_err(|e| log_and_convert("validate_tenant_integrity", e))
    }

    async fn summarize_violations(
        &self,
        window_days: u32,
    ) -> Result<Vec<ViolationSummary>, TenantIsolationError> {
        self.auditor
            .summarize(window_days)
            .await
            .map_err(|e| log_and_convert("summarize_violations", e.into()))
    }
}
