//! Serde-facing connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConnectOpts, DbError, DbHandle, Result};

/// Pool knobs as they appear in configuration files.
///
/// Durations use humantime notation (`"30s"`, `"5m"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolCfg {
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: Option<bool>,
}

impl PoolCfg {
    /// Overlay these settings on top of [`ConnectOpts::default`].
    #[must_use]
    pub fn to_connect_opts(&self) -> ConnectOpts {
        let defaults = ConnectOpts::default();
        ConnectOpts {
            max_conns: self.max_conns.or(defaults.max_conns),
            min_conns: self.min_conns.or(defaults.min_conns),
            acquire_timeout: self.acquire_timeout.or(defaults.acquire_timeout),
            idle_timeout: self.idle_timeout.or(defaults.idle_timeout),
            max_lifetime: self.max_lifetime.or(defaults.max_lifetime),
            test_before_acquire: self
                .test_before_acquire
                .unwrap_or(defaults.test_before_acquire),
        }
    }
}

/// One data store: a DSN plus pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbConnConfig {
    pub dsn: String,
    #[serde(default)]
    pub pool: PoolCfg,
}

impl DbConnConfig {
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            pool: PoolCfg::default(),
        }
    }

    /// Open a pool for this store.
    ///
    /// # Errors
    /// Returns `DbError::InvalidConfig` for an empty DSN, otherwise whatever
    /// [`DbHandle::connect`] returns.
    pub async fn connect(&self) -> Result<DbHandle> {
        if self.dsn.trim().is_empty() {
            return Err(DbError::InvalidConfig("dsn must not be empty".to_owned()));
        }
        DbHandle::connect(&self.dsn, self.pool.to_connect_opts()).await
    }
}
