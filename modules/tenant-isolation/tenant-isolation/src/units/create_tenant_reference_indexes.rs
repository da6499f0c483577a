use async_trait::async_trait;

use crate::domain::migration::{MigrationStep, MigrationUnit, MigrationUnitError};
use crate::domain::schema::IndexSpec;

/// Composite `(tenant column, foreign key)` index for each declared parent
/// reference, so tenant-scoped joins and the orphan sweep stay cheap.
pub struct CreateTenantReferenceIndexes;

impl CreateTenantReferenceIndexes {
    pub const NAME: &'static str = "CreateTenantReferenceIndexes";
}

fn index_name(table: &str, tenant_column: &str, fk: &str) -> String {
    format!("idx_{table}_{tenant_column}_{fk}")
}

#[async_trait]
impl MigrationUnit for CreateTenantReferenceIndexes {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reversible(&self) -> bool {
        true
    }

    async fn up(&self, step: &MigrationStep<'_>) -> Result<(), MigrationUnitError> {
        let schema = step.schema();
        for (table, policy) in step.tables().isolated_tables() {
            if policy.references.is_empty() || !schema.has_table(table).await? {
                continue;
            }
            let tenant_column = policy.tenant_column.as_str();
            if !schema.has_column(table, tenant_column).await? {
                return Err(MigrationUnitError::Precondition(format!(
                    "'{table}' has no '{tenant_column}' column; run AddTenantIdColumns first"
                )));
            }
            for r in &policy.references {
                let name = index_name(table, tenant_column, &r.column);
                schema
                    .create_index(&IndexSpec::new(&name, table, &[tenant_column, &r.column]))
                    .await?;
            }
        }
        Ok(())
    }

    async fn down(&self, step: &MigrationStep<'_>) -> Result<(), MigrationUnitError> {
        let schema = step.schema();
        for (table, policy) in step.tables().isolated_tables() {
            if !schema.has_table(table).await? {
                continue;
            }
            for r in &policy.references {
                let name = index_name(table, &policy.tenant_column, &r.column);
                schema.drop_index(table, &name).await?;
            }
        }
        Ok(())
    }
}
