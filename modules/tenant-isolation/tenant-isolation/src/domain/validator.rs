//! Read-only integrity sweeps over one tenant's store.
//!
//! Two independent checks per isolation-required table: rows with no owning
//! tenant, and rows whose declared parent reference does not resolve to a
//! parent of the same tenant. Only `SELECT COUNT(*)` statements are issued.

use std::sync::Arc;

use sea_orm::sea_query::{Alias, Asterisk, Expr, Func, Query, SelectStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use sea_orm_migration::SchemaManager;
use tenant_isolation_sdk::{IntegrityIssue, IssueType, Severity, TenantId};
use tracing::{debug, info};

use crate::domain::error::DomainError;
use crate::domain::registry::TenantRegistry;
use crate::domain::tables::{ParentReference, TablePolicy, TableRegistry};

pub struct IntegrityValidator {
    registry: Arc<dyn TenantRegistry>,
    tables: Arc<TableRegistry>,
}

impl IntegrityValidator {
    #[must_use]
    pub fn new(registry: Arc<dyn TenantRegistry>, tables: Arc<TableRegistry>) -> Self {
        Self { registry, tables }
    }

    /// Sweep the store of `tenant_id`.
    ///
    /// # Errors
    /// `Registry` if the tenant is unknown or unreachable, `Database` if a
    /// count query fails.
    pub async fn validate_tenant_integrity(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<IntegrityIssue>, DomainError> {
        let db = self.registry.connection(tenant_id).await?;
        let issues = self.sweep(db.sea(), tenant_id).await?;
        info!(%tenant_id, issues = issues.len(), "tenant integrity sweep finished");
        Ok(issues)
    }

    /// Run both sweeps on an already open connection.
    ///
    /// # Errors
    /// Any [`DbErr`] from the metadata or count queries.
    pub async fn sweep(
        &self,
        conn: &DatabaseConnection,
        tenant_id: TenantId,
    ) -> Result<Vec<IntegrityIssue>, DbErr> {
        let manager = SchemaManager::new(conn);
        let mut issues = Vec::new();

        for (table, policy) in self.tables.isolated_tables() {
            if !manager.has_table(table).await? {
                debug!(%tenant_id, table, "table absent, not swept");
                continue;
            }
            let tenant_scoped = manager.has_column(table, &policy.tenant_column).await?;

            let missing = count(conn, &missing_tenant_query(table, policy, tenant_scoped)).await?;
            if missing > 0 {
                issues.push(IntegrityIssue {
                    table: table.to_owned(),
                    issue_type: IssueType::MissingTenantId,
                    related_table: None,
                    count: missing,
                    severity: Severity::High,
                });
            }

            for reference in &policy.references {
                if !manager.has_table(&reference.parent_table).await? {
                    continue;
                }
                let parent_scoped = match self.tables.policy(&reference.parent_table) {
                    Some(p) if p.isolation_required => manager
                        .has_column(&reference.parent_table, &p.tenant_column)
                        .await?
                        .then_some(p.tenant_column.as_str()),
                    _ => None,
                };
                let child_tenant = tenant_scoped.then_some((policy.tenant_column.as_str(), tenant_id));
                let stmt = orphan_query(table, reference, child_tenant, parent_scoped);
                let orphans = count(conn, &stmt).await?;
                if orphans > 0 {
                    issues.push(IntegrityIssue {
                        table: table.to_owned(),
                        issue_type: IssueType::OrphanedReference,
                        related_table: Some(reference.parent_table.clone()),
                        count: orphans,
                        severity: Severity::Medium,
                    });
                }
            }
        }
        Ok(issues)
    }
}

/// Rows with a NULL tenant column, or every row when the column is missing.
fn missing_tenant_query(table: &str, policy: &TablePolicy, tenant_scoped: bool) -> SelectStatement {
    let mut q = Query::select();
    q.expr(Func::count(Expr::col(Asterisk)))
        .from(Alias::new(table));
    if tenant_scoped {
        q.and_where(Expr::col(Alias::new(policy.tenant_column.as_str())).is_null());
    }
    q
}

/// Child rows of the tenant whose non-null key finds no parent of the same tenant.
///
/// `child_tenant` restricts the children to one tenant; `parent_tenant_column`
/// additionally requires the parent to carry the child's tenant.
fn orphan_query(
    table: &str,
    reference: &ParentReference,
    child_tenant: Option<(&str, TenantId)>,
    parent_tenant_column: Option<&str>,
) -> SelectStatement {
    let child = Alias::new("c");
    let parent = Alias::new("p");
    let fk = Alias::new(reference.column.as_str());

    let mut exists = Query::select();
    exists
        .expr(Expr::val(1))
        .from_as(Alias::new(reference.parent_table.as_str()), parent.clone())
        .and_where(
            Expr::col((parent.clone(), Alias::new(reference.parent_key.as_str())))
                .equals((child.clone(), fk.clone())),
        );

    let mut q = Query::select();
    q.expr(Func::count(Expr::col(Asterisk)))
        .from_as(Alias::new(table), child.clone())
        .and_where(Expr::col((child.clone(), fk)).is_not_null());

    if let Some((column, tenant_id)) = child_tenant {
        q.and_where(Expr::col((child.clone(), Alias::new(column))).eq(tenant_id));
        if let Some(parent_column) = parent_tenant_column {
            exists.and_where(
                Expr::col((parent, Alias::new(parent_column)))
                    .equals((child, Alias::new(column))),
            );
        }
    }

    q.and_where(Expr::exists(exists).not());
    q
}

async fn count(conn: &DatabaseConnection, stmt: &SelectStatement) -> Result<u64, DbErr> {
    let backend = conn.get_database_backend();
    let row = conn.query_one(backend.build(stmt)).await?;
    let n: i64 = match row {
        Some(row) => row.try_get_by_index(0)?,
        None => 0,
    };
    Ok(u64::try_from(n).unwrap_or_default())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use sea_orm::DatabaseBackend;
    use uuid::Uuid;

    #[test]
    fn orphan_query_scopes_child_and_parent() {
        let reference = ParentReference {
            column: "member_id".to_owned(),
            parent_table: "members".to_owned(),
            parent_key: "id".to_owned(),
        };
        let stmt = orphan_query(
            "loans",
            &reference,
            Some(("tenant_id", Uuid::nil())),
            Some("tenant_id"),
        );
        let sql = DatabaseBackend::Sqlite.build(&stmt).to_string();
        assert!(sql.contains(r#"FROM "loans" AS "c""#), "{sql}");
        assert!(sql.contains(r#"NOT EXISTS"#), "{sql}");
        assert!(sql.contains(r#""p"."tenant_id" = "c"."tenant_id""#), "{sql}");
        assert!(sql.contains(r#""c"."member_id" IS NOT NULL"#), "{sql}");
    }

    #[test]
    fn missing_tenant_query_counts_everything_without_column() {
        let policy = TablePolicy::isolated();
        let sql = DatabaseBackend::Sqlite
            .build(&missing_tenant_query("loans", &policy, false))
            .to_string();
        assert!(!sql.contains("WHERE"), "{sql}");

        let sql = DatabaseBackend::Sqlite
            .build(&missing_tenant_query("loans", &policy, true))
            .to_string();
        assert!(sql.contains(r#""tenant_id" IS NULL"#), "{sql}");
    }
}
