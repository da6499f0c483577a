//! Tenant registry backed by configuration.
//!
//! Each tenant names its own data store. Pools are opened on first use and
//! kept for the life of the registry.

use async_trait::async_trait;
use coopkit_db::DbHandle;
use dashmap::DashMap;
use tenant_isolation_sdk::{TenantFilter, TenantId, TenantInfo};
use tracing::{debug, info};

use crate::config::StaticTenantConfig;
use crate::domain::error::RegistryError;
use crate::domain::registry::TenantRegistry;

pub struct StaticTenantRegistry {
    tenants: Vec<StaticTenantConfig>,
    pools: DashMap<TenantId, DbHandle>,
}

impl StaticTenantRegistry {
    #[must_use]
    pub fn new(tenants: Vec<StaticTenantConfig>) -> Self {
        Self {
            tenants,
            pools: DashMap::new(),
        }
    }

    fn find(&self, tenant_id: TenantId) -> Option<&StaticTenantConfig> {
        self.tenants.iter().find(|t| t.id == tenant_id)
    }
}

#[async_trait]
impl TenantRegistry for StaticTenantRegistry {
    async fn list_tenants(&self, filter: &TenantFilter) -> Result<Vec<TenantInfo>, RegistryError> {
        Ok(self
            .tenants
            .iter()
            .map(|t| TenantInfo {
                id: t.id,
                slug: t.slug.clone(),
                status: t.status,
            })
            .filter(|t| filter.matches(t))
            .collect())
    }

    async fn connection(&self, tenant_id: TenantId) -> Result<DbHandle, RegistryError> {
        if let Some(db) = self.pools.get(&tenant_id) {
            return Ok(db.clone());
        }
        let cfg = self
            .find(tenant_id)
            .ok_or(RegistryError::TenantNotFound(tenant_id))?;

        debug!(%tenant_id, slug = %cfg.slug, "opening tenant store");
        let db = cfg
            .db
            .connect()
            .await
            .map_err(|e| RegistryError::Connection {
                tenant_id,
                message: e.to_string(),
            })?;
        info!(%tenant_id, dsn = %db.redacted_dsn(), "tenant store connected");

        // a concurrent caller may have won the race; keep its pool
        Ok(self.pools.entry(tenant_id).or_insert(db).clone())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use coopkit_db::DbConnConfig;
    use tenant_isolation_sdk::TenantStatus;
    use uuid::Uuid;

    fn tenant(slug: &str, status: TenantStatus, dsn: &str) -> StaticTenantConfig {
        StaticTenantConfig {
            id: Uuid::new_v4(),
            slug: slug.to_owned(),
            status,
            db: DbConnConfig::new(dsn),
        }
    }

    #[tokio::test]
    async fn lists_active_tenants_in_config_order() {
        let registry = StaticTenantRegistry::new(vec![
            tenant("a", TenantStatus::Active, "sqlite::memory:"),
            tenant("b", TenantStatus::Suspended, "sqlite::memory:"),
            tenant("c", TenantStatus::Active, "sqlite::memory:"),
        ]);
        let slugs: Vec<_> = registry
            .list_tenants(&TenantFilter::active())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.slug)
            .collect();
        assert_eq!(slugs, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn connections_are_cached_and_errors_typed() {
        let ok = tenant("a", TenantStatus::Active, "sqlite::memory:");
        let bad = tenant("b", TenantStatus::Active, "nosuchdb://x");
        let (ok_id, bad_id) = (ok.id, bad.id);
        let registry = StaticTenantRegistry::new(vec![ok, bad]);

        registry.connection(ok_id).await.unwrap();
        registry.connection(ok_id).await.unwrap();
        assert_eq!(registry.pools.len(), 1);

        assert!(matches!(
            registry.connection(bad_id).await,
            Err(RegistryError::Connection { .. })
        ));
        assert!(matches!(
            registry.connection(Uuid::new_v4()).await,
            Err(RegistryError::TenantNotFound(_))
        ));
    }
}
