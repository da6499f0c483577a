use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, Query};
use tracing::info;

use crate::domain::migration::{MigrationStep, MigrationUnit, MigrationUnitError};

/// Stamps the tenant's id on every row of its store whose tenant column is NULL.
///
/// Meant for stores that hold exactly one tenant's rows. There is no way to
/// tell afterwards which rows were NULL before, so this unit cannot be reversed.
pub struct BackfillTenantIds;

impl BackfillTenantIds {
    pub const NAME: &'static str = "BackfillTenantIds";
}

#[async_trait]
impl MigrationUnit for BackfillTenantIds {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn up(&self, step: &MigrationStep<'_>) -> Result<(), MigrationUnitError> {
        let schema = step.schema();
        for (table, policy) in step.tables().isolated_tables() {
            if !schema.has_table(table).await? {
                continue;
            }
            let column = policy.tenant_column.as_str();
            if !schema.has_column(table, column).await? {
                return Err(MigrationUnitError::Precondition(format!(
                    "'{table}' has no '{column}' column; run AddTenantIdColumns first"
                )));
            }
            let stmt = Query::update()
                .table(Alias::new(table))
                .value(Alias::new(column), Expr::val(step.tenant_id()))
                .and_where(Expr::col(Alias::new(column)).is_null())
                .to_owned();
            let rows = schema.execute_statement(table, &stmt).await?;
            if rows > 0 {
                info!(tenant_id = %step.tenant_id(), table, rows, "backfilled tenant ids");
            }
        }
        Ok(())
    }
}
