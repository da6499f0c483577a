//! Tenant Isolation Module
//!
//! Row-level tenant isolation for writes and a migration orchestrator that
//! applies named schema and data changes to every tenant's store, one
//! transaction per tenant, with a per-attempt ledger.
//!
//! - [`domain::enforcement`] - [`TenantSession`](domain::enforcement::TenantSession), the policed write path
//! - [`domain::orchestrator`] - fan-out of migration units over active tenants
//! - [`domain::validator`] - read-only integrity sweeps
//! - [`units`] - built-in migration units
//! - [`module::TenantIsolationModule`] - wiring and the local client
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod domain;
pub mod infra;
pub mod module;
pub mod telemetry;
pub mod units;

pub use config::TenantIsolationConfig;
pub use domain::enforcement::{IsolationGuard, TenantScopedEntity, TenantSession};
pub use domain::migration::{MigrationCatalog, MigrationStep, MigrationUnit, MigrationUnitError};
pub use domain::orchestrator::{MigrationOrchestrator, OrchestratorConfig};
pub use domain::tables::{TablePolicy, TableRegistry};
pub use module::TenantIsolationModule;
