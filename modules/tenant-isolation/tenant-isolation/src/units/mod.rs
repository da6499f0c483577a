//! Built-in migration units driven by the table registry.

mod add_tenant_id_columns;
mod backfill_tenant_ids;
mod create_tenant_reference_indexes;

use std::sync::Arc;

pub use add_tenant_id_columns::AddTenantIdColumns;
pub use backfill_tenant_ids::BackfillTenantIds;
pub use create_tenant_reference_indexes::CreateTenantReferenceIndexes;

use crate::domain::migration::MigrationCatalog;

/// Catalog holding every built-in unit.
#[must_use]
pub fn builtin_catalog() -> MigrationCatalog {
    let mut catalog = MigrationCatalog::new();
    for unit in [
        Arc::new(AddTenantIdColumns) as Arc<_>,
        Arc::new(BackfillTenantIds) as Arc<_>,
        Arc::new(CreateTenantReferenceIndexes) as Arc<_>,
    ] {
        // names are distinct constants
        _ = catalog.register(unit);
    }
    catalog
}

pub(crate) fn tenant_index_name(table: &str) -> String {
    format!("idx_{table}_tenant")
}
