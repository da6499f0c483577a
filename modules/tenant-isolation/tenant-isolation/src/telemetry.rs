//! Logging setup for binaries and tests embedding this module.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// One JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(cfg: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(cfg.filter());
    let result = if cfg.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    result.is_ok()
}
