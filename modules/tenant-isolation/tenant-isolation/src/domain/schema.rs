//! Schema mutation primitives.
//!
//! Every primitive runs on the one transaction the caller opened for one
//! tenant's store. Mutating primitives look at schema metadata first and only
//! act when the object is missing (or present, for drops), so migration units
//! built from them can be re-run safely. Nothing here retries.

use sea_orm::sea_query::{Alias, ColumnDef, Index, Table};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseTransaction, DbErr, Statement, StatementBuilder,
    Value,
};
use sea_orm_migration::SchemaManager;
use thiserror::Error;
use tracing::debug;

/// A primitive failed against one tenant's store.
#[derive(Debug, Error)]
#[error("{operation} on '{target}' failed: {source}")]
pub struct SchemaMutationError {
    pub operation: &'static str,
    pub target: String,
    #[source]
    pub source: DbErr,
}

impl SchemaMutationError {
    fn new(operation: &'static str, target: impl Into<String>, source: DbErr) -> Self {
        Self {
            operation,
            target: target.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// The schema already had the requested shape; nothing was executed.
    AlreadyInPlace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Integer,
    BigInteger,
    Text,
    Boolean,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl ColumnSpec {
    /// Nullable column, the only kind that can be added to a populated table
    /// without a default.
    #[must_use]
    pub fn nullable(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            nullable: true,
        }
    }

    fn to_def(&self) -> ColumnDef {
        let mut def = ColumnDef::new(Alias::new(&self.name));
        match self.kind {
            ColumnKind::Uuid => def.uuid(),
            ColumnKind::Integer => def.integer(),
            ColumnKind::BigInteger => def.big_integer(),
            ColumnKind::Text => def.text(),
            ColumnKind::Boolean => def.boolean(),
            ColumnKind::Timestamp => def.timestamp_with_time_zone(),
        };
        if self.nullable {
            def.null();
        } else {
            def.not_null();
        }
        def
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    #[must_use]
    pub fn new(name: &str, table: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            table: table.to_owned(),
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            unique: false,
        }
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Schema primitives bound to one open transaction.
#[derive(Clone, Copy)]
pub struct SchemaMutator<'a> {
    txn: &'a DatabaseTransaction,
}

impl<'a> SchemaMutator<'a> {
    #[must_use]
    pub fn new(txn: &'a DatabaseTransaction) -> Self {
        Self { txn }
    }

    #[must_use]
    pub fn backend(&self) -> DatabaseBackend {
        self.txn.get_database_backend()
    }

    fn manager(&self) -> SchemaManager<'a> {
        SchemaManager::new(self.txn)
    }

    /// # Errors
    /// Returns [`SchemaMutationError`] if metadata cannot be read.
    pub async fn has_table(&self, table: &str) -> Result<bool, SchemaMutationError> {
        self.manager()
            .has_table(table)
            .await
            .map_err(|e| SchemaMutationError::new("has_table", table, e))
    }

    /// # Errors
    /// Returns [`SchemaMutationError`] if metadata cannot be read.
    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool, SchemaMutationError> {
        self.manager()
            .has_column(table, column)
            .await
            .map_err(|e| SchemaMutationError::new("has_column", format!("{table}.{column}"), e))
    }

    /// # Errors
    /// Returns [`SchemaMutationError`] if metadata cannot be read.
    pub async fn has_index(&self, table: &str, index: &str) -> Result<bool, SchemaMutationError> {
        self.manager()
            .has_index(table, index)
            .await
            .map_err(|e| SchemaMutationError::new("has_index", index, e))
    }

    /// Add `column` to `table` unless it already exists.
    ///
    /// # Errors
    /// Returns [`SchemaMutationError`] on any driver failure.
    pub async fn add_column(
        &self,
        table: &str,
        column: &ColumnSpec,
    ) -> Result<MutationOutcome, SchemaMutationError> {
        if self.has_column(table, &column.name).await? {
            return Ok(MutationOutcome::AlreadyInPlace);
        }
        let stmt = Table::alter()
            .table(Alias::new(table))
            .add_column(&mut column.to_def())
            .to_owned();
        self.manager()
            .alter_table(stmt)
            .await
            .map_err(|e| SchemaMutationError::new("add_column", format!("{table}.{}", column.name), e))?;
        debug!(table, column = %column.name, "column added");
        Ok(MutationOutcome::Applied)
    }

    /// Drop `column` from `table` if it exists.
    ///
    /// # Errors
    /// Returns [`SchemaMutationError`] on any driver failure.
    pub async fn drop_column(
        &self,
        table: &str,
        column: &str,
    ) -> Result<MutationOutcome, SchemaMutationError> {
        if !self.has_column(table, column).await? {
            return Ok(MutationOutcome::AlreadyInPlace);
        }
        let stmt = Table::alter()
            .table(Alias::new(table))
            .drop_column(Alias::new(column))
            .to_owned();
        self.manager()
            .alter_table(stmt)
            .await
            .map_err(|e| SchemaMutationError::new("drop_column", format!("{table}.{column}"), e))?;
        debug!(table, column, "column dropped");
        Ok(MutationOutcome::Applied)
    }

    /// Create `index` unless an index with that name exists on the table.
    ///
    /// # Errors
    /// Returns [`SchemaMutationError`] on any driver failure.
    pub async fn create_index(&self, index: &IndexSpec) -> Result<MutationOutcome, SchemaMutationError> {
        if self.has_index(&index.table, &index.name).await? {
            return Ok(MutationOutcome::AlreadyInPlace);
        }
        let mut stmt = Index::create();
        stmt.name(&index.name).table(Alias::new(&index.table));
        for col in &index.columns {
            stmt.col(Alias::new(col));
        }
        if index.unique {
            stmt.unique();
        }
        self.manager()
            .create_index(stmt)
            .await
            .map_err(|e| SchemaMutationError::new("create_index", &index.name, e))?;
        debug!(table = %index.table, index = %index.name, "index created");
        Ok(MutationOutcome::Applied)
    }

    /// Drop index `name` on `table` if it exists.
    ///
    /// # Errors
    /// Returns [`SchemaMutationError`] on any driver failure.
    pub async fn drop_index(&self, table: &str, name: &str) -> Result<MutationOutcome, SchemaMutationError> {
        if !self.has_index(table, name).await? {
            return Ok(MutationOutcome::AlreadyInPlace);
        }
        let stmt = Index::drop().name(name).table(Alias::new(table)).to_owned();
        self.manager()
            .drop_index(stmt)
            .await
            .map_err(|e| SchemaMutationError::new("drop_index", name, e))?;
        debug!(table, index = name, "index dropped");
        Ok(MutationOutcome::Applied)
    }

    /// Run a raw statement. Returns the number of affected rows.
    ///
    /// # Errors
    /// Returns [`SchemaMutationError`] carrying the driver error.
    pub async fn execute(&self, sql: &str) -> Result<u64, SchemaMutationError> {
        self.txn
            .execute_unprepared(sql)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| SchemaMutationError::new("execute", sql, e))
    }

    /// Run a raw statement with bound values, using the backend's placeholder style.
    ///
    /// # Errors
    /// Returns [`SchemaMutationError`] carrying the driver error.
    pub async fn execute_with(
        &self,
        sql: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<u64, SchemaMutationError> {
        let stmt = Statement::from_sql_and_values(self.backend(), sql, values);
        self.txn
            .execute(stmt)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| SchemaMutationError::new("execute", sql, e))
    }

    /// Run a statement built with `sea-query`.
    ///
    /// # Errors
    /// Returns [`SchemaMutationError`] carrying the driver error.
    pub async fn execute_statement<S: StatementBuilder>(
        &self,
        target: &str,
        stmt: &S,
    ) -> Result<u64, SchemaMutationError> {
        let built = self.backend().build(stmt);
        self.txn
            .execute(built)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| SchemaMutationError::new("execute", target, e))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use coopkit_db::{ConnectOpts, DbHandle};

    async fn db_with_members() -> DbHandle {
        let db = DbHandle::connect(
            "sqlite::memory:",
            ConnectOpts {
                max_conns: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        db.sea()
            .execute_unprepared("CREATE TABLE members (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn add_column_is_check_then_act() {
        let db = db_with_members().await;
        let txn = db.begin().await.unwrap();
        let m = SchemaMutator::new(&txn);
        let col = ColumnSpec::nullable("tenant_id", ColumnKind::Uuid);

        assert_eq!(m.add_column("members", &col).await.unwrap(), MutationOutcome::Applied);
        assert_eq!(
            m.add_column("members", &col).await.unwrap(),
            MutationOutcome::AlreadyInPlace
        );
        assert!(m.has_column("members", "tenant_id").await.unwrap());
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn index_create_and_drop_round_trip() {
        let db = db_with_members().await;
        let txn = db.begin().await.unwrap();
        let m = SchemaMutator::new(&txn);
        let idx = IndexSpec::new("idx_members_name", "members", &["name"]);

        assert_eq!(m.create_index(&idx).await.unwrap(), MutationOutcome::Applied);
        assert_eq!(m.create_index(&idx).await.unwrap(), MutationOutcome::AlreadyInPlace);
        assert!(m.has_index("members", "idx_members_name").await.unwrap());

        assert_eq!(
            m.drop_index("members", "idx_members_name").await.unwrap(),
            MutationOutcome::Applied
        );
        assert_eq!(
            m.drop_index("members", "idx_members_name").await.unwrap(),
            MutationOutcome::AlreadyInPlace
        );
        txn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn drop_missing_column_is_noop() {
        let db = db_with_members().await;
        let txn = db.begin().await.unwrap();
        let m = SchemaMutator::new(&txn);
        assert_eq!(
            m.drop_column("members", "nope").await.unwrap(),
            MutationOutcome::AlreadyInPlace
        );
        txn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn execute_reports_driver_error() {
        let db = db_with_members().await;
        let txn = db.begin().await.unwrap();
        let m = SchemaMutator::new(&txn);

        assert_eq!(
            m.execute("INSERT INTO members (id, name) VALUES (1, 'ana')").await.unwrap(),
            1
        );
        let n = m
            .execute_with(
                "UPDATE members SET name = ? WHERE id = ?",
                [Value::from("ana maria"), Value::from(1_i32)],
            )
            .await
            .unwrap();
        assert_eq!(n, 1);

        let err = m.execute("INSERT INTO nowhere VALUES (1)").await.unwrap_err();
        assert_eq!(err.operation, "execute");
        assert!(err.to_string().contains("nowhere"));
        txn.rollback().await.unwrap();
    }
}
