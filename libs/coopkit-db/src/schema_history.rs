//! Control-plane schema history.
//!
//! Applies `sea-orm-migration` migrations that create the platform's own
//! bookkeeping tables (migration ledger, violation log). Each component gets a
//! private history table named `coop_schema_history__<component>__<hash8>` so
//! two components may reuse a migration name without colliding.
//!
//! This is not the tenant migration orchestrator: it runs once against one
//! store, stops at the first failure, and skips migrations already recorded.

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::sea_query::{Alias, ColumnDef, Expr, Query, Table};
use sea_orm::{ConnectionTrait, DbErr, TransactionTrait};
use sea_orm_migration::{MigrationTrait, SchemaManager};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::DbHandle;

const VERSION_COL: &str = "version";
const APPLIED_AT_COL: &str = "applied_at";

#[derive(Debug, Error)]
pub enum SchemaHistoryError {
    #[error("failed to create schema history table for '{component}': {source}")]
    CreateHistoryTable { component: String, source: DbErr },

    #[error("failed to read schema history for '{component}': {source}")]
    ReadHistory { component: String, source: DbErr },

    #[error("schema migration '{migration}' failed for '{component}': {source}")]
    MigrationFailed {
        component: String,
        migration: String,
        source: DbErr,
    },

    #[error("failed to record schema migration '{migration}' for '{component}': {source}")]
    RecordFailed {
        component: String,
        migration: String,
        source: DbErr,
    },

    #[error("duplicate schema migration name '{name}' for '{component}'")]
    DuplicateName { component: String, name: String },
}

/// Outcome of one schema history run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaHistoryResult {
    pub applied: Vec<String>,
    pub skipped: usize,
}

fn sanitize(component: &str) -> String {
    let out: String = component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() { "_".to_owned() } else { out }
}

/// History table name for `component`, capped at the 63-byte Postgres limit.
#[must_use]
pub fn history_table_name(component: &str) -> String {
    const PREFIX: &str = "coop_schema_history__";
    const SEP: &str = "__";
    const HASH_LEN: usize = 8;
    const PG_IDENT_MAX: usize = 63;

    let hash = format!("{:016x}", xxh3_64(component.as_bytes()));
    let budget = PG_IDENT_MAX - PREFIX.len() - SEP.len() - HASH_LEN;
    let mut middle = sanitize(component);
    middle.truncate(budget);

    format!("{PREFIX}{middle}{SEP}{}", &hash[..HASH_LEN])
}

async fn ensure_history_table<C: ConnectionTrait>(
    conn: &C,
    table: &str,
    component: &str,
) -> Result<(), SchemaHistoryError> {
    let stmt = Table::create()
        .table(Alias::new(table))
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new(VERSION_COL))
                .string_len(255)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(Alias::new(APPLIED_AT_COL))
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();

    let backend = conn.get_database_backend();
    conn.execute(backend.build(&stmt))
        .await
        .map_err(|source| SchemaHistoryError::CreateHistoryTable {
            component: component.to_owned(),
            source,
        })?;
    Ok(())
}

async fn applied_versions<C: ConnectionTrait>(
    conn: &C,
    table: &str,
    component: &str,
) -> Result<HashSet<String>, SchemaHistoryError> {
    let read_err = |source| SchemaHistoryError::ReadHistory {
        component: component.to_owned(),
        source,
    };

    let stmt = Query::select()
        .column(Alias::new(VERSION_COL))
        .from(Alias::new(table))
        .to_owned();
    let backend = conn.get_database_backend();
    let rows = conn.query_all(backend.build(&stmt)).await.map_err(read_err)?;

    rows.iter()
        .map(|row| row.try_get::<String>("", VERSION_COL).map_err(read_err))
        .collect()
}

async fn record_version<C: ConnectionTrait>(
    conn: &C,
    table: &str,
    version: &str,
) -> Result<(), DbErr> {
    let stmt = Query::insert()
        .into_table(Alias::new(table))
        .columns([Alias::new(VERSION_COL), Alias::new(APPLIED_AT_COL)])
        .values_panic([Expr::val(version).into(), Expr::val(Utc::now()).into()])
        .to_owned();
    let backend = conn.get_database_backend();
    conn.execute(backend.build(&stmt)).await?;
    Ok(())
}

fn reject_duplicates(
    component: &str,
    migrations: &[Box<dyn MigrationTrait>],
) -> Result<(), SchemaHistoryError> {
    let mut seen = HashSet::new();
    for m in migrations {
        if !seen.insert(m.name()) {
            return Err(SchemaHistoryError::DuplicateName {
                component: component.to_owned(),
                name: m.name().to_owned(),
            });
        }
    }
    Ok(())
}

/// Apply `migrations` for `component`, in name order, each in its own transaction.
///
/// # Errors
/// Returns [`SchemaHistoryError`] on duplicate names, history table failures,
/// or the first migration that fails (earlier migrations stay applied).
pub async fn run_component_migrations(
    db: &DbHandle,
    component: &str,
    mut migrations: Vec<Box<dyn MigrationTrait>>,
) -> Result<SchemaHistoryResult, SchemaHistoryError> {
    let mut result = SchemaHistoryResult::default();
    if migrations.is_empty() {
        debug!(component, "no schema migrations to run");
        return Ok(result);
    }
    reject_duplicates(component, &migrations)?;

    let conn = db.sea();
    let table = history_table_name(component);
    ensure_history_table(conn, &table, component).await?;
    let applied = applied_versions(conn, &table, component).await?;

    migrations.sort_by(|a, b| a.name().cmp(b.name()));

    for migration in migrations {
        let name = migration.name().to_owned();
        if applied.contains(&name) {
            debug!(component, migration = %name, "schema migration already applied");
            result.skipped += 1;
            continue;
        }

        let failed = |source| SchemaHistoryError::MigrationFailed {
            component: component.to_owned(),
            migration: name.clone(),
            source,
        };

        let txn = conn.begin().await.map_err(failed)?;
        let manager = SchemaManager::new(&txn);
        if let Err(source) = migration.up(&manager).await {
            _ = txn.rollback().await;
            return Err(failed(source));
        }
        if let Err(source) = record_version(&txn, &table, &name).await {
            _ = txn.rollback().await;
            return Err(SchemaHistoryError::RecordFailed {
                component: component.to_owned(),
                migration: name.clone(),
                source,
            });
        }
        txn.commit().await.map_err(failed)?;

        info!(component, migration = %name, "schema migration applied");
        result.applied.push(name);
    }

    info!(
        component,
        applied = result.applied.len(),
        skipped = result.skipped,
        "schema history up to date"
    );
    Ok(result)
}

/// Names of `migrations` not yet recorded for `component`.
///
/// # Errors
/// Returns [`SchemaHistoryError::ReadHistory`] if the history cannot be read.
pub async fn pending_component_migrations(
    db: &DbHandle,
    component: &str,
    migrations: &[Box<dyn MigrationTrait>],
) -> Result<Vec<String>, SchemaHistoryError> {
    let conn = db.sea();
    let table = history_table_name(component);

    let exists = SchemaManager::new(conn)
        .has_table(&table)
        .await
        .map_err(|source| SchemaHistoryError::ReadHistory {
            component: component.to_owned(),
            source,
        })?;
    if !exists {
        return Ok(migrations.iter().map(|m| m.name().to_owned()).collect());
    }

    let applied = applied_versions(conn, &table, component).await?;
    Ok(migrations
        .iter()
        .filter(|m| !applied.contains(m.name()))
        .map(|m| m.name().to_owned())
        .collect())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_non_identifier_chars() {
        assert_eq!(sanitize("tenant-isolation"), "tenant_isolation");
        assert_eq!(sanitize("a.b/c"), "a_b_c");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn history_table_name_is_stable_and_bounded() {
        let a = history_table_name("tenant-isolation");
        assert_eq!(a, history_table_name("tenant-isolation"));
        assert!(a.starts_with("coop_schema_history__tenant_isolation__"));
        assert!(a.len() <= 63);

        let long = history_table_name(&"x".repeat(200));
        assert!(long.len() <= 63);
    }

    #[test]
    fn different_components_get_different_tables() {
        assert_ne!(history_table_name("a-b"), history_table_name("a_b"));
    }
}
