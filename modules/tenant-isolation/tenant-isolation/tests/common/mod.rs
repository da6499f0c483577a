#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use coopkit_db::{ConnectOpts, DbConnConfig, DbHandle, PoolCfg};
use sea_orm::ConnectionTrait;
use sea_orm_migration::SchemaManager;
use tenant_isolation::config::{AuditConfig, TenantIsolationConfig};
use tenant_isolation::domain::error::RegistryError;
use tenant_isolation::domain::migration::MigrationCatalog;
use tenant_isolation::domain::registry::TenantRegistry;
use tenant_isolation::telemetry::LoggingConfig;
use tenant_isolation::units::builtin_catalog;
use tenant_isolation::{OrchestratorConfig, TablePolicy, TenantIsolationModule};
use tenant_isolation_sdk::{TenantFilter, TenantId, TenantInfo, TenantStatus};
use uuid::Uuid;

pub mod member {
    use sea_orm::entity::prelude::*;
    use tenant_isolation::TenantScopedEntity;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "members")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Option<Uuid>,
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TenantScopedEntity for Entity {
        fn tenant_col() -> Option<Column> {
            Some(Column::TenantId)
        }
    }
}

pub mod loan {
    use sea_orm::entity::prelude::*;
    use tenant_isolation::TenantScopedEntity;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "loans")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Option<Uuid>,
        pub member_id: Option<Uuid>,
        pub amount: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TenantScopedEntity for Entity {
        fn tenant_col() -> Option<Column> {
            Some(Column::TenantId)
        }
    }
}

/// Shared lookup table, registered as exempt.
pub mod interest_rate {
    use sea_orm::entity::prelude::*;
    use tenant_isolation::TenantScopedEntity;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "interest_rates")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: i32,
        pub tenant_id: Option<Uuid>,
        pub basis_points: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TenantScopedEntity for Entity {
        fn tenant_col() -> Option<Column> {
            Some(Column::TenantId)
        }
    }
}

/// Tenant-scoped entity whose table nobody registered.
pub mod savings {
    use sea_orm::entity::prelude::*;
    use tenant_isolation::TenantScopedEntity;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "savings")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Option<Uuid>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TenantScopedEntity for Entity {
        fn tenant_col() -> Option<Column> {
            Some(Column::TenantId)
        }
    }
}

pub fn tenant(n: u128) -> TenantId {
    Uuid::from_u128(n)
}

pub async fn memory_db() -> DbHandle {
    DbHandle::connect(
        "sqlite::memory:",
        ConnectOpts {
            max_conns: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

/// Tables as they look before tenant isolation was introduced.
pub async fn create_legacy_schema(db: &DbHandle) {
    for sql in [
        "CREATE TABLE members (id uuid_text PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE loans (id uuid_text PRIMARY KEY, member_id uuid_text, amount INTEGER NOT NULL)",
        "CREATE TABLE interest_rates (id INTEGER PRIMARY KEY, basis_points INTEGER NOT NULL)",
    ] {
        db.sea().execute_unprepared(sql).await.unwrap();
    }
}

/// Tables with tenant columns in place.
pub async fn create_scoped_schema(db: &DbHandle) {
    for sql in [
        "CREATE TABLE members (id uuid_text PRIMARY KEY, tenant_id uuid_text, name TEXT NOT NULL)",
        "CREATE TABLE loans (id uuid_text PRIMARY KEY, tenant_id uuid_text, member_id uuid_text, amount INTEGER NOT NULL)",
        "CREATE TABLE interest_rates (id INTEGER PRIMARY KEY, tenant_id uuid_text, basis_points INTEGER NOT NULL)",
        "CREATE TABLE savings (id uuid_text PRIMARY KEY, tenant_id uuid_text)",
    ] {
        db.sea().execute_unprepared(sql).await.unwrap();
    }
}

pub async fn has_column(db: &DbHandle, table: &str, column: &str) -> bool {
    SchemaManager::new(db.sea()).has_column(table, column).await.unwrap()
}

pub async fn has_index(db: &DbHandle, table: &str, index: &str) -> bool {
    SchemaManager::new(db.sea()).has_index(table, index).await.unwrap()
}

pub fn table_policies() -> BTreeMap<String, TablePolicy> {
    BTreeMap::from([
        ("members".to_owned(), TablePolicy::isolated()),
        (
            "loans".to_owned(),
            TablePolicy::isolated().references("member_id", "members"),
        ),
        ("interest_rates".to_owned(), TablePolicy::exempt()),
    ])
}

pub fn config() -> TenantIsolationConfig {
    TenantIsolationConfig {
        control_db: DbConnConfig {
            dsn: "sqlite::memory:".to_owned(),
            pool: PoolCfg {
                max_conns: Some(1),
                ..Default::default()
            },
        },
        tables: table_policies(),
        orchestrator: OrchestratorConfig::default(),
        audit: AuditConfig::default(),
        logging: LoggingConfig::default(),
        tenants: Vec::new(),
    }
}

/// In-memory tenant registry. A tenant registered without a store is
/// listed but cannot be reached.
#[derive(Default)]
pub struct TestRegistry {
    tenants: Vec<TenantInfo>,
    stores: HashMap<TenantId, Option<DbHandle>>,
}

impl TestRegistry {
    pub fn add(&mut self, id: TenantId, status: TenantStatus, store: Option<DbHandle>) {
        self.tenants.push(TenantInfo {
            id,
            slug: format!("tenant-{}", id.as_u128()),
            status,
        });
        self.stores.insert(id, store);
    }
}

#[async_trait]
impl TenantRegistry for TestRegistry {
    async fn list_tenants(&self, filter: &TenantFilter) -> Result<Vec<TenantInfo>, RegistryError> {
        Ok(self
            .tenants
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn connection(&self, tenant_id: TenantId) -> Result<DbHandle, RegistryError> {
        match self.stores.get(&tenant_id) {
            None => Err(RegistryError::TenantNotFound(tenant_id)),
            Some(None) => Err(RegistryError::Connection {
                tenant_id,
                message: "connection refused".to_owned(),
            }),
            Some(Some(db)) => Ok(db.clone()),
        }
    }
}

/// A module over in-memory tenant stores with the legacy schema.
pub struct Harness {
    pub module: TenantIsolationModule,
    pub stores: HashMap<TenantId, DbHandle>,
}

impl Harness {
    pub fn store(&self, n: u128) -> &DbHandle {
        &self.stores[&tenant(n)]
    }
}

pub struct HarnessBuilder {
    reachable: Vec<u128>,
    unreachable: Vec<u128>,
    inactive: Vec<u128>,
    config: TenantIsolationConfig,
    catalog: MigrationCatalog,
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        reachable: Vec::new(),
        unreachable: Vec::new(),
        inactive: Vec::new(),
        config: config(),
        catalog: builtin_catalog(),
    }
}

impl HarnessBuilder {
    pub fn tenants(mut self, ns: &[u128]) -> Self {
        self.reachable.extend_from_slice(ns);
        self
    }

    pub fn unreachable(mut self, ns: &[u128]) -> Self {
        self.unreachable.extend_from_slice(ns);
        self
    }

    pub fn inactive(mut self, ns: &[u128]) -> Self {
        self.inactive.extend_from_slice(ns);
        self
    }

    pub fn orchestrator(mut self, cfg: OrchestratorConfig) -> Self {
        self.config.orchestrator = cfg;
        self
    }

    pub fn catalog(mut self, catalog: MigrationCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Tenants are registered in ascending id order.
    pub async fn build(self) -> Harness {
        let mut all: Vec<(u128, &str)> = self
            .reachable
            .iter()
            .map(|n| (*n, "ok"))
            .chain(self.unreachable.iter().map(|n| (*n, "down")))
            .chain(self.inactive.iter().map(|n| (*n, "inactive")))
            .collect();
        all.sort_unstable();

        let mut registry = TestRegistry::default();
        let mut stores = HashMap::new();
        for (n, kind) in all {
            match kind {
                "down" => registry.add(tenant(n), TenantStatus::Active, None),
                _ => {
                    let db = memory_db().await;
                    create_legacy_schema(&db).await;
                    let status = if kind == "inactive" {
                        TenantStatus::Inactive
                    } else {
                        TenantStatus::Active
                    };
                    registry.add(tenant(n), status, Some(db.clone()));
                    stores.insert(tenant(n), db);
                }
            }
        }

        let module = TenantIsolationModule::init_with(&self.config, Arc::new(registry), self.catalog)
            .await
            .unwrap();
        Harness { module, stores }
    }
}
