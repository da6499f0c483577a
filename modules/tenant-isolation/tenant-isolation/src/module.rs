//! Wiring: control database, persistence, enforcement, orchestration.

use std::sync::Arc;

use anyhow::Context;
use coopkit_db::DbHandle;
use coopkit_db::schema_history::run_component_migrations;
use tenant_isolation_sdk::{TenantIsolationClient, TenantIsolationError, ViolationSummary};
use tracing::info;

use crate::config::TenantIsolationConfig;
use crate::domain::auditor::ViolationAuditor;
use crate::domain::enforcement::IsolationGuard;
use crate::domain::local_client::TenantIsolationLocalClient;
use crate::domain::migration::MigrationCatalog;
use crate::domain::orchestrator::MigrationOrchestrator;
use crate::domain::registry::TenantRegistry;
use crate::domain::tables::TableRegistry;
use crate::domain::validator::IntegrityValidator;
use crate::infra::StaticTenantRegistry;
use crate::infra::storage::migrations::migrations;
use crate::infra::storage::{SeaOrmMigrationLedger, SeaOrmViolationStore};
use crate::units::builtin_catalog;

/// Schema history component name for the control-plane tables.
pub const COMPONENT: &str = "tenant-isolation";

pub struct TenantIsolationModule {
    control_db: DbHandle,
    tables: Arc<TableRegistry>,
    guard: Arc<IsolationGuard>,
    auditor: Arc<ViolationAuditor>,
    orchestrator: Arc<MigrationOrchestrator>,
    validator: Arc<IntegrityValidator>,
    summary_window_days: u32,
}

impl TenantIsolationModule {
    /// Build from configuration with the static tenant registry and the
    /// built-in migration units.
    ///
    /// # Errors
    /// Invalid table registry, unreachable control database, or a failed
    /// control-plane schema migration.
    pub async fn init(cfg: &TenantIsolationConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(StaticTenantRegistry::new(cfg.tenants.clone()));
        Self::init_with(cfg, registry, builtin_catalog()).await
    }

    /// # Errors
    /// See [`TenantIsolationModule::init`].
    pub async fn init_with(
        cfg: &TenantIsolationConfig,
        registry: Arc<dyn TenantRegistry>,
        catalog: MigrationCatalog,
    ) -> anyhow::Result<Self> {
        let tables = Arc::new(cfg.table_registry().context("invalid table registry")?);

        let control_db = cfg
            .control_db
            .connect()
            .await
            .context("connecting to control database")?;
        let history = run_component_migrations(&control_db, COMPONENT, migrations())
            .await
            .context("migrating control database")?;
        info!(
            dsn = %control_db.redacted_dsn(),
            applied = history.applied.len(),
            skipped = history.skipped,
            "control database ready"
        );

        let store = Arc::new(SeaOrmViolationStore::new(control_db.sea().clone()));
        let auditor = Arc::new(ViolationAuditor::new(store));
        let guard = Arc::new(IsolationGuard::new(tables.clone(), auditor.clone()));
        let ledger = Arc::new(SeaOrmMigrationLedger::new(control_db.sea().clone()));
        let orchestrator = Arc::new(MigrationOrchestrator::new(
            registry.clone(),
            Arc::new(catalog),
            guard.clone(),
            ledger,
            cfg.orchestrator.clone(),
        ));
        let validator = Arc::new(IntegrityValidator::new(registry, tables.clone()));

        info!(
            tables = tables.len(),
            migrations = orchestrator.catalog().names().count(),
            parallelism = cfg.orchestrator.parallelism,
            "tenant isolation module initialized"
        );

        Ok(Self {
            control_db,
            tables,
            guard,
            auditor,
            orchestrator,
            validator,
            summary_window_days: cfg.audit.summary_window_days,
        })
    }

    #[must_use]
    pub fn client(&self) -> Arc<dyn TenantIsolationClient> {
        Arc::new(TenantIsolationLocalClient::new(
            self.orchestrator.clone(),
            self.validator.clone(),
            self.auditor.clone(),
        ))
    }

    /// Enforcement entry point for request-time writes.
    #[must_use]
    pub fn guard(&self) -> &Arc<IsolationGuard> {
        &self.guard
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<MigrationOrchestrator> {
        &self.orchestrator
    }

    #[must_use]
    pub fn validator(&self) -> &Arc<IntegrityValidator> {
        &self.validator
    }

    #[must_use]
    pub fn auditor(&self) -> &Arc<ViolationAuditor> {
        &self.auditor
    }

    #[must_use]
    pub fn tables(&self) -> &Arc<TableRegistry> {
        &self.tables
    }

    #[must_use]
    pub fn control_db(&self) -> &DbHandle {
        &self.control_db
    }

    /// Violation counts over the configured summary window.
    ///
    /// # Errors
    /// `Internal` if the violation log cannot be read.
    pub async fn violation_report(&self) -> Result<Vec<ViolationSummary>, TenantIsolationError> {
        self.client()
            .summarize_violations(self.summary_window_days)
            .await
    }
}
