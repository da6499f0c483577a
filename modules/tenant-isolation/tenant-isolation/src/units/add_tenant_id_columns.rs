use async_trait::async_trait;
use tracing::debug;

use crate::domain::migration::{MigrationStep, MigrationUnit, MigrationUnitError};
use crate::domain::schema::{ColumnKind, ColumnSpec, IndexSpec};
use crate::units::tenant_index_name;

/// Adds a nullable tenant column and an index on it to every isolation-required
/// table present in the tenant's store.
pub struct AddTenantIdColumns;

impl AddTenantIdColumns {
    pub const NAME: &'static str = "AddTenantIdColumns";
}

#[async_trait]
impl MigrationUnit for AddTenantIdColumns {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reversible(&self) -> bool {
        true
    }

    async fn up(&self, step: &MigrationStep<'_>) -> Result<(), MigrationUnitError> {
        let schema = step.schema();
        for (table, policy) in step.tables().isolated_tables() {
            if !schema.has_table(table).await? {
                debug!(tenant_id = %step.tenant_id(), table, "table absent, skipping");
                continue;
            }
            let column = &policy.tenant_column;
            schema
                .add_column(table, &ColumnSpec::nullable(column, ColumnKind::Uuid))
                .await?;
            schema
                .create_index(&IndexSpec::new(&tenant_index_name(table), table, &[column]))
                .await?;
        }
        Ok(())
    }

    async fn down(&self, step: &MigrationStep<'_>) -> Result<(), MigrationUnitError> {
        let schema = step.schema();
        for (table, policy) in step.tables().isolated_tables() {
            if !schema.has_table(table).await? {
                continue;
            }
            schema.drop_index(table, &tenant_index_name(table)).await?;
            schema.drop_column(table, &policy.tenant_column).await?;
        }
        Ok(())
    }
}
