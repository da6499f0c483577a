#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Database connectivity for the cooperative platform.
//!
//! A [`DbHandle`] owns one pooled connection to one physical data store. The
//! tenant isolation layer holds one handle per tenant store plus one for the
//! control plane (migration ledger, violation log).
//!
//! # Features
//! - `pg`, `mysql`, `sqlite`: enable the matching sqlx backend (`sqlite` is default)
//!
//! # Example
//! ```rust,no_run
//! # async fn demo() -> coopkit_db::Result<()> {
//! use coopkit_db::{ConnectOpts, DbHandle};
//!
//! let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default()).await?;
//! let txn = db.begin().await?;
//! // ... run statements against `txn` ...
//! txn.commit().await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(
    not(any(feature = "pg", feature = "mysql", feature = "sqlite")),
    allow(unused_imports, unused_variables, dead_code, unreachable_code)
)]

pub mod config;
pub mod schema_history;

mod pool_opts;

pub use config::{DbConnConfig, PoolCfg};
pub use schema_history::{
    SchemaHistoryError, SchemaHistoryResult, pending_component_migrations,
    run_component_migrations,
};

use std::time::Duration;

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
use pool_opts::ApplyPoolOpts;

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Typed error for the DB handle and helpers.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
    #[error(transparent)]
    Sqlx(#[from] sea_orm::sqlx::Error),

    #[error(transparent)]
    Sea(#[from] sea_orm::DbErr),
}

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

impl DbEngine {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DbEngine::Postgres => "postgres",
            DbEngine::MySql => "mysql",
            DbEngine::Sqlite => "sqlite",
        }
    }
}

/// Connection pool options; each driver applies the subset it supports.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// Maximum number of connections in the pool.
    pub max_conns: Option<u32>,
    /// Minimum number of connections in the pool.
    pub min_conns: Option<u32>,
    /// Timeout to acquire a connection from the pool.
    pub acquire_timeout: Option<Duration>,
    /// Idle timeout before a connection is closed.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime for a connection.
    pub max_lifetime: Option<Duration>,
    /// Test connection health before acquire.
    pub test_before_acquire: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
            test_before_acquire: false,
        }
    }
}

#[cfg(feature = "sqlite")]
const SQLITE_BUSY_TIMEOUT_MS: i64 = 5000;

/// Pooled connection to one data store.
#[derive(Debug, Clone)]
pub struct DbHandle {
    engine: DbEngine,
    dsn: String,
    sea: DatabaseConnection,
}

impl DbHandle {
    /// Detect engine by DSN scheme.
    ///
    /// # Errors
    /// Returns `DbError::UnknownDsn` if the DSN scheme is not recognized.
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbEngine::Postgres)
        } else if s.starts_with("mysql://") {
            Ok(DbEngine::MySql)
        } else if s.starts_with("sqlite:") {
            Ok(DbEngine::Sqlite)
        } else {
            Err(DbError::UnknownDsn(redact_credentials_in_dsn(dsn)))
        }
    }

    /// Connect and build a handle.
    ///
    /// # Errors
    /// Returns an error if the DSN is invalid, the backend feature is disabled,
    /// or the pool cannot be established.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        let engine = Self::detect(dsn)?;
        let sea = match engine {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => {
                let pool = sea_orm::sqlx::postgres::PgPoolOptions::new()
                    .apply(&opts)
                    .connect(dsn)
                    .await?;
                sea_orm::SqlxPostgresConnector::from_sqlx_postgres_pool(pool)
            }
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => {
                return Err(DbError::FeatureDisabled("PostgreSQL feature not enabled"));
            }
            #[cfg(feature = "mysql")]
            DbEngine::MySql => {
                let pool = sea_orm::sqlx::mysql::MySqlPoolOptions::new()
                    .apply(&opts)
                    .connect(dsn)
                    .await?;
                sea_orm::SqlxMySqlConnector::from_sqlx_mysql_pool(pool)
            }
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => return Err(DbError::FeatureDisabled("MySQL feature not enabled")),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => {
                let is_memory = is_memory_dsn(dsn);
                let pool = sea_orm::sqlx::sqlite::SqlitePoolOptions::new()
                    .apply(&opts)
                    .after_connect(move |conn, _meta| {
                        Box::pin(async move {
                            // In-memory stores are private to the pool; file stores
                            // may be shared with other processes.
                            if !is_memory {
                                sea_orm::sqlx::query("PRAGMA busy_timeout = ?")
                                    .bind(SQLITE_BUSY_TIMEOUT_MS)
                                    .execute(&mut *conn)
                                    .await?;
                            }
                            Ok(())
                        })
                    })
                    .connect(dsn)
                    .await?;
                sea_orm::SqlxSqliteConnector::from_sqlx_sqlite_pool(pool)
            }
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => return Err(DbError::FeatureDisabled("SQLite feature not enabled")),
        };

        tracing::debug!(
            engine = engine.as_str(),
            dsn = %redact_credentials_in_dsn(dsn),
            "database pool established"
        );

        Ok(Self {
            engine,
            dsn: dsn.to_owned(),
            sea,
        })
    }

    /// Get the backend.
    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    /// DSN with credentials redacted, safe for logs.
    #[must_use]
    pub fn redacted_dsn(&self) -> String {
        redact_credentials_in_dsn(&self.dsn)
    }

    /// Begin a transaction on this store.
    ///
    /// # Errors
    /// Returns an error if no connection can be acquired or `BEGIN` fails.
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        Ok(self.sea.begin().await?)
    }

    /// Underlying `SeaORM` connection.
    ///
    /// Infrastructure-only: tenant-owned tables must be written through the
    /// isolation layer's session, which wraps a transaction from [`DbHandle::begin`].
    #[must_use]
    pub fn sea(&self) -> &DatabaseConnection {
        &self.sea
    }

    /// Graceful pool close.
    ///
    /// # Errors
    /// Returns an error if the driver reports a failure while closing.
    pub async fn close(self) -> Result<()> {
        self.sea.close().await?;
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
fn is_memory_dsn(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

/// Replace the password component of a URL-style DSN with `***`.
///
/// A DSN that carries credentials but does not parse is replaced entirely.
#[must_use]
pub fn redact_credentials_in_dsn(dsn: &str) -> String {
    if !dsn.contains('@') {
        return dsn.to_owned();
    }
    match url::Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() && parsed.set_password(Some("***")).is_err() {
                return "***".to_owned();
            }
            parsed.to_string()
        }
        Err(_) => "***".to_owned(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn detect_known_schemes() {
        assert_eq!(
            DbHandle::detect("postgres://u:p@h/db").unwrap(),
            DbEngine::Postgres
        );
        assert_eq!(
            DbHandle::detect("postgresql://h/db").unwrap(),
            DbEngine::Postgres
        );
        assert_eq!(DbHandle::detect("mysql://h/db").unwrap(), DbEngine::MySql);
        assert_eq!(
            DbHandle::detect("  sqlite::memory:").unwrap(),
            DbEngine::Sqlite
        );
    }

    #[test]
    fn detect_unknown_scheme_redacts_password() {
        let err = DbHandle::detect("oracle://admin:hunter2@db/prod").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("admin:***@db"), "{msg}");
        assert!(!msg.contains("hunter2"));
    }

    #[test]
    fn redact_leaves_dsn_without_password_untouched() {
        assert_eq!(
            redact_credentials_in_dsn("postgres://app@db:5432/x"),
            "postgres://app@db:5432/x"
        );
        assert_eq!(redact_credentials_in_dsn("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn redact_hides_whole_password_containing_at_sign() {
        let redacted = redact_credentials_in_dsn("postgres://app:p@ss@db:5432/x");
        assert_eq!(redacted, "postgres://app:***@db:5432/x");
        assert!(!redacted.contains("ss@"), "{redacted}");
    }

    #[test]
    fn redact_replaces_unparseable_dsn_with_credentials() {
        assert_eq!(redact_credentials_in_dsn("postgres://app:secret@[bad/x"), "***");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_memory_connect_and_transaction() -> Result<()> {
        use sea_orm::{ConnectionTrait, Statement};

        let db = DbHandle::connect(
            "sqlite::memory:",
            ConnectOpts {
                max_conns: Some(1),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(db.engine(), DbEngine::Sqlite);

        let backend = db.sea().get_database_backend();
        db.sea()
            .execute(Statement::from_string(
                backend,
                "CREATE TABLE t (id INTEGER PRIMARY KEY)",
            ))
            .await?;

        let txn = db.begin().await?;
        txn.execute(Statement::from_string(backend, "INSERT INTO t (id) VALUES (1)"))
            .await?;
        txn.rollback().await?;

        let row = db
            .sea()
            .query_one(Statement::from_string(backend, "SELECT COUNT(*) AS n FROM t"))
            .await?
            .expect("count row");
        let n: i64 = row.try_get("", "n")?;
        assert_eq!(n, 0);
        Ok(())
    }
}
