//! Module configuration.
//!
//! ```yaml
//! control_db:
//!   dsn: "sqlite://coop_control.db"
//!   pool: { max_conns: 4, acquire_timeout: "10s" }
//! tables:
//!   members: {}
//!   loans:
//!     references:
//!       - { column: member_id, parent_table: members }
//!   interest_rates: { isolation_required: false }
//! orchestrator: { parallelism: 1, skip_after_failure: true }
//! audit: { summary_window_days: 30 }
//! logging: { level: "info", json: false }
//! tenants:
//!   - id: "550e8400-e29b-41d4-a716-446655440001"
//!     slug: "riverside"
//!     db: { dsn: "sqlite://riverside.db" }
//! ```
//!
//! Every key can be overridden from the environment with the `COOP_` prefix
//! and `__` between levels, e.g. `COOP_ORCHESTRATOR__PARALLELISM=4`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use coopkit_db::config::DbConnConfig;
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;
use tenant_isolation_sdk::{TenantId, TenantStatus};

use crate::domain::orchestrator::OrchestratorConfig;
use crate::domain::tables::{TablePolicy, TableRegistry, TableRegistryError};
use crate::telemetry::LoggingConfig;

pub const ENV_PREFIX: &str = "COOP_";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantIsolationConfig {
    /// Store holding the migration ledger and the violation log.
    pub control_db: DbConnConfig,
    #[serde(default)]
    pub tables: BTreeMap<String, TablePolicy>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Static tenant registry entries. Empty when tenants come from elsewhere.
    #[serde(default)]
    pub tenants: Vec<StaticTenantConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub summary_window_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            summary_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticTenantConfig {
    pub id: TenantId,
    pub slug: String,
    #[serde(default)]
    pub status: TenantStatus,
    /// The tenant's own data store.
    pub db: DbConnConfig,
}

impl TenantIsolationConfig {
    /// Read `path` as YAML, then apply `COOP_` environment overrides.
    ///
    /// # Errors
    /// Fails if the file is unreadable or the merged result does not match
    /// the schema.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let figment = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
            .with_context(|| format!("loading tenant isolation config from {}", path.display()))
    }

    /// # Errors
    /// Fails if the figment does not extract into this schema.
    pub fn from_figment(figment: &Figment) -> anyhow::Result<Self> {
        Ok(figment.extract()?)
    }

    /// # Errors
    /// See [`TableRegistry::new`].
    pub fn table_registry(&self) -> Result<TableRegistry, TableRegistryError> {
        TableRegistry::new(self.tables.clone())
    }
}
