//! SeaORM-backed violation store on the control database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use tenant_isolation_sdk::{IsolationViolation, ViolationSummary};

use super::entity::rls_violation::{self, Column};
use super::mapper::{parse_operation, parse_violation_type, violation_to_active_model};
use crate::domain::auditor::ViolationStore;
use crate::domain::error::AuditError;

pub struct SeaOrmViolationStore {
    conn: DatabaseConnection,
}

impl SeaOrmViolationStore {
    #[must_use]
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ViolationStore for SeaOrmViolationStore {
    async fn append(&self, violation: &IsolationViolation) -> Result<(), AuditError> {
        violation_to_active_model(violation).insert(&self.conn).await?;
        Ok(())
    }

    async fn counts_since(&self, since: DateTime<Utc>) -> Result<Vec<ViolationSummary>, AuditError> {
        let rows: Vec<(String, String, String, i64)> = rls_violation::Entity::find()
            .select_only()
            .column(Column::TableName)
            .column(Column::Operation)
            .column(Column::ViolationType)
            .column_as(Expr::col(Column::Id).count(), "count")
            .filter(Column::AttemptedAt.gte(since))
            .group_by(Column::TableName)
            .group_by(Column::Operation)
            .group_by(Column::ViolationType)
            .into_tuple()
            .all(&self.conn)
            .await?;

        rows.into_iter()
            .map(|(table_name, operation, violation_type, count)| {
                Ok(ViolationSummary {
                    table_name,
                    operation: parse_operation(&operation)?,
                    violation_type: parse_violation_type(&violation_type)?,
                    count: u64::try_from(count).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn recent(&self, limit: u64) -> Result<Vec<IsolationViolation>, AuditError> {
        rls_violation::Entity::find()
            .order_by_desc(Column::AttemptedAt)
            .limit(limit)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(IsolationViolation::try_from)
            .collect()
    }
}
