//! Migration orchestrator: fans a migration unit out over every active tenant.
//!
//! Each tenant attempt runs in its own transaction on the tenant's own store,
//! with a [`TenantSession`](crate::domain::enforcement::TenantSession) whose
//! context is that tenant. A failed attempt is recorded and the batch moves on;
//! only setup failures (unknown migration, registry unreachable) abort a call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sea_orm::DbErr;
use serde::Deserialize;
use tenant_isolation_sdk::{
    BatchResult, MigrationBatch, MigrationDirection, MigrationRecord, MigrationStatus,
    TenantFilter, TenantId, TenantOutcome,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::enforcement::IsolationGuard;
use crate::domain::error::{DomainError, RegistryError};
use crate::domain::ledger::MigrationLedger;
use crate::domain::migration::{MigrationCatalog, MigrationStep, MigrationUnit, MigrationUnitError};
use crate::domain::registry::TenantRegistry;
use crate::domain::report::{BatchReportSink, TracingReportSink};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Tenant attempts in flight at once. `1` runs tenants one after another.
    pub parallelism: usize,
    /// In a multi-migration batch, stop attempting later migrations on a
    /// tenant once one of its earlier migrations failed.
    pub skip_after_failure: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            skip_after_failure: true,
        }
    }
}

/// Why one tenant attempt failed. Rendered into the outcome and the ledger.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Unit(#[from] MigrationUnitError),

    #[error("transaction error: {0}")]
    Transaction(#[source] DbErr),
}

pub struct MigrationOrchestrator {
    registry: Arc<dyn TenantRegistry>,
    catalog: Arc<MigrationCatalog>,
    guard: Arc<IsolationGuard>,
    ledger: Arc<dyn MigrationLedger>,
    reports: Arc<dyn BatchReportSink>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl MigrationOrchestrator {
    #[must_use]
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        catalog: Arc<MigrationCatalog>,
        guard: Arc<IsolationGuard>,
        ledger: Arc<dyn MigrationLedger>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            catalog,
            guard,
            ledger,
            reports: Arc::new(TracingReportSink),
            config,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_report_sink(mut self, sink: Arc<dyn BatchReportSink>) -> Self {
        self.reports = sink;
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &MigrationCatalog {
        &self.catalog
    }

    /// Cancelling the token stops running batches before their next tenant.
    /// An attempt already in flight still commits or rolls back.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Apply one migration to one tenant and record the attempt.
    ///
    /// # Errors
    /// `UnknownMigration`, or `Registry(TenantNotFound)`; neither is recorded.
    /// Every other failure is an outcome with `success = false`.
    pub async fn run_on_tenant(
        &self,
        tenant_id: TenantId,
        migration: &str,
    ) -> Result<TenantOutcome, DomainError> {
        let unit = self
            .catalog
            .get(migration)
            .ok_or_else(|| DomainError::UnknownMigration(migration.to_owned()))?;
        self.attempt(tenant_id, unit.as_ref(), MigrationDirection::Up)
            .await
    }

    /// # Errors
    /// `UnknownMigration`, or `Registry` when active tenants cannot be listed.
    pub async fn run_on_all_tenants(&self, migration: &str) -> Result<BatchResult, DomainError> {
        self.batch(&[migration.to_owned()], MigrationDirection::Up)
            .await
    }

    /// # Errors
    /// `UnknownMigration`, or `Registry` when active tenants cannot be listed.
    pub async fn rollback_on_all_tenants(
        &self,
        migration: &str,
    ) -> Result<BatchResult, DomainError> {
        self.batch(&[migration.to_owned()], MigrationDirection::Down)
            .await
    }

    /// Apply `migrations` in order, each one across all active tenants before
    /// the next starts.
    ///
    /// # Errors
    /// `UnknownMigration`, or `Registry` when active tenants cannot be listed.
    pub async fn run_batch(&self, migrations: &[String]) -> Result<BatchResult, DomainError> {
        self.batch(migrations, MigrationDirection::Up).await
    }

    /// Reverse `migrations` last to first, each one across all active tenants.
    ///
    /// # Errors
    /// `UnknownMigration`, or `Registry` when active tenants cannot be listed.
    pub async fn rollback_batch(&self, migrations: &[String]) -> Result<BatchResult, DomainError> {
        self.batch(migrations, MigrationDirection::Down).await
    }

    /// Ledger records, newest first.
    ///
    /// # Errors
    /// `Ledger` if the ledger cannot be read.
    pub async fn migration_status(
        &self,
        migration: Option<&str>,
    ) -> Result<Vec<MigrationRecord>, DomainError> {
        self.ledger.list(migration).await.map_err(DomainError::Ledger)
    }

    /// Whether the tenant's latest attempt of `migration` was a successful `up`.
    ///
    /// # Errors
    /// `Ledger` if the ledger cannot be read.
    pub async fn is_applied(&self, tenant_id: TenantId, migration: &str) -> Result<bool, DomainError> {
        let latest = self
            .ledger
            .latest(tenant_id, migration)
            .await
            .map_err(DomainError::Ledger)?;
        Ok(latest.is_some_and(|r| {
            r.direction == MigrationDirection::Up && r.status == MigrationStatus::Success
        }))
    }

    async fn batch(
        &self,
        names: &[String],
        direction: MigrationDirection,
    ) -> Result<BatchResult, DomainError> {
        let mut units = self.catalog.resolve(names)?;
        if direction == MigrationDirection::Down {
            units.reverse();
        }
        let tenants: Vec<TenantId> = self
            .registry
            .list_tenants(&TenantFilter::active())
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();

        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %batch_id,
            direction = direction.as_str(),
            migrations = units.len(),
            tenants = tenants.len(),
            parallelism = self.config.parallelism,
            "migration batch started"
        );

        // tenant -> first migration of this batch that failed on it
        let mut blocked: HashMap<TenantId, String> = HashMap::new();
        let mut migrations = Vec::with_capacity(units.len());
        for unit in &units {
            if self.cancel.is_cancelled() {
                warn!(%batch_id, migration = unit.name(), "batch cancelled, remaining migrations not attempted");
                break;
            }
            let outcomes = self
                .fan_out(&tenants, unit.as_ref(), direction, &blocked)
                .await;
            if self.config.skip_after_failure {
                for o in outcomes.iter().filter(|o| !o.success) {
                    blocked
                        .entry(o.tenant_id)
                        .or_insert_with(|| unit.name().to_owned());
                }
            }
            migrations.push(MigrationBatch {
                name: unit.name().to_owned(),
                outcomes,
            });
        }

        let result = BatchResult {
            batch_id,
            direction,
            started_at,
            completed_at: Utc::now(),
            migrations,
        };
        let summary = result.summary();
        if summary.failed > 0 {
            warn!(
                %batch_id,
                total = summary.total,
                successful = summary.successful,
                failed = summary.failed,
                "migration batch finished with failures"
            );
        } else {
            info!(%batch_id, total = summary.total, "migration batch finished");
        }
        self.reports.publish(&result.report());
        Ok(result)
    }

    /// One migration over `tenants`, at most `parallelism` at a time.
    /// Outcomes come back in tenant order. Tenants reached after
    /// cancellation get no outcome; blocked tenants get an unrecorded one.
    async fn fan_out(
        &self,
        tenants: &[TenantId],
        unit: &dyn MigrationUnit,
        direction: MigrationDirection,
        blocked: &HashMap<TenantId, String>,
    ) -> Vec<TenantOutcome> {
        stream::iter(tenants.iter().copied())
            .map(|tenant_id| async move {
                if self.cancel.is_cancelled() {
                    debug!(%tenant_id, migration = unit.name(), "cancelled before attempt");
                    return None;
                }
                // not an attempt: reported in the batch, never written to the ledger
                if let Some(blocker) = blocked.get(&tenant_id) {
                    warn!(%tenant_id, migration = unit.name(), blocker = %blocker, "migration skipped");
                    let reason = format!("skipped: migration '{blocker}' failed earlier in this batch");
                    return Some(TenantOutcome::failed(tenant_id, unit.name(), direction, reason));
                }
                let outcome = match self.attempt(tenant_id, unit, direction).await {
                    Ok(outcome) => outcome,
                    // tenant vanished between listing and connecting
                    Err(e) => {
                        self.finish(tenant_id, unit.name(), direction, Err(e.to_string()))
                            .await
                    }
                };
                Some(outcome)
            })
            .buffered(self.config.parallelism.max(1))
            .filter_map(futures::future::ready)
            .collect()
            .await
    }

    async fn attempt(
        &self,
        tenant_id: TenantId,
        unit: &dyn MigrationUnit,
        direction: MigrationDirection,
    ) -> Result<TenantOutcome, DomainError> {
        match self.execute(tenant_id, unit, direction).await {
            Err(AttemptError::Registry(RegistryError::TenantNotFound(id))) => {
                Err(RegistryError::TenantNotFound(id).into())
            }
            result => Ok(self
                .finish(tenant_id, unit.name(), direction, result.map_err(|e| e.to_string()))
                .await),
        }
    }

    async fn execute(
        &self,
        tenant_id: TenantId,
        unit: &dyn MigrationUnit,
        direction: MigrationDirection,
    ) -> Result<(), AttemptError> {
        if direction == MigrationDirection::Down && !unit.reversible() {
            return Err(MigrationUnitError::NonReversible {
                name: unit.name().to_owned(),
            }
            .into());
        }

        let db = self.registry.connection(tenant_id).await?;
        let txn = db.begin().await.map_err(|e| {
            AttemptError::Registry(RegistryError::Connection {
                tenant_id,
                message: e.to_string(),
            })
        })?;

        let result = {
            let session = self.guard.session_for(&txn, tenant_id);
            let step = MigrationStep::new(tenant_id, &session);
            match direction {
                MigrationDirection::Up => unit.up(&step).await,
                MigrationDirection::Down => unit.down(&step).await,
            }
        };

        match result {
            Ok(()) => txn.commit().await.map_err(AttemptError::Transaction),
            Err(e) => {
                if let Err(rb) = txn.rollback().await {
                    error!(%tenant_id, migration = unit.name(), error = %rb, "rollback failed");
                }
                Err(e.into())
            }
        }
    }

    /// Log the attempt, append its record, and build the outcome.
    async fn finish(
        &self,
        tenant_id: TenantId,
        migration: &str,
        direction: MigrationDirection,
        result: Result<(), String>,
    ) -> TenantOutcome {
        let outcome = match result {
            Ok(()) => {
                info!(%tenant_id, migration, direction = direction.as_str(), "migration applied");
                TenantOutcome::succeeded(tenant_id, migration, direction)
            }
            Err(message) => {
                error!(
                    %tenant_id,
                    migration,
                    direction = direction.as_str(),
                    error = %message,
                    "migration failed"
                );
                TenantOutcome::failed(tenant_id, migration, direction, message)
            }
        };

        let record = MigrationRecord {
            tenant_id,
            migration_name: migration.to_owned(),
            direction,
            status: outcome.status(),
            executed_at: Utc::now(),
            error_message: outcome.error.clone(),
        };
        if let Err(e) = self.ledger.append(&record).await {
            error!(%tenant_id, migration, error = %e, "failed to record migration attempt");
        }
        outcome
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_sequential_and_skipping() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.parallelism, 1);
        assert!(cfg.skip_after_failure);

        let cfg: OrchestratorConfig = serde_json::from_str(r#"{"parallelism": 4}"#).unwrap();
        assert_eq!(cfg.parallelism, 4);
        assert!(cfg.skip_after_failure);

        assert!(serde_json::from_str::<OrchestratorConfig>(r#"{"workers": 4}"#).is_err());
    }

    #[test]
    fn attempt_errors_render_their_cause() {
        let id = Uuid::new_v4();
        let e = AttemptError::from(RegistryError::Connection {
            tenant_id: id,
            message: "connection refused".to_owned(),
        });
        assert!(e.to_string().contains("connection refused"));
        let e = AttemptError::from(MigrationUnitError::NonReversible {
            name: "BackfillTenantIds".to_owned(),
        });
        assert_eq!(e.to_string(), "migration 'BackfillTenantIds' is not reversible");
    }
}
