//! SeaORM-backed migration ledger on the control database.

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};
use tenant_isolation_sdk::{MigrationRecord, TenantId};

use super::entity::tenant_migration;
use super::mapper::record_to_active_model;
use crate::domain::ledger::MigrationLedger;

pub struct SeaOrmMigrationLedger {
    conn: DatabaseConnection,
}

impl SeaOrmMigrationLedger {
    #[must_use]
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl MigrationLedger for SeaOrmMigrationLedger {
    async fn append(&self, record: &MigrationRecord) -> Result<(), DbErr> {
        record_to_active_model(record).insert(&self.conn).await?;
        Ok(())
    }

    async fn list(&self, migration: Option<&str>) -> Result<Vec<MigrationRecord>, DbErr> {
        let mut query = tenant_migration::Entity::find();
        if let Some(name) = migration {
            query = query.filter(tenant_migration::Column::MigrationName.eq(name));
        }
        query
            .order_by_desc(tenant_migration::Column::ExecutedAt)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(MigrationRecord::try_from)
            .collect()
    }

    async fn latest(
        &self,
        tenant_id: TenantId,
        migration: &str,
    ) -> Result<Option<MigrationRecord>, DbErr> {
        tenant_migration::Entity::find()
            .filter(tenant_migration::Column::TenantId.eq(tenant_id))
            .filter(tenant_migration::Column::MigrationName.eq(migration))
            .order_by_desc(tenant_migration::Column::ExecutedAt)
            .one(&self.conn)
            .await?
            .map(MigrationRecord::try_from)
            .transpose()
    }
}
