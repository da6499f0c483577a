use async_trait::async_trait;
use sea_orm::DbErr;
use tenant_isolation_sdk::{MigrationRecord, TenantId};

/// Append-only store of per-tenant migration attempts.
#[async_trait]
pub trait MigrationLedger: Send + Sync {
    async fn append(&self, record: &MigrationRecord) -> Result<(), DbErr>;

    /// Records newest first, optionally restricted to one migration.
    async fn list(&self, migration: Option<&str>) -> Result<Vec<MigrationRecord>, DbErr>;

    /// Most recent attempt of `migration` on `tenant_id`.
    async fn latest(
        &self,
        tenant_id: TenantId,
        migration: &str,
    ) -> Result<Option<MigrationRecord>, DbErr>;
}
