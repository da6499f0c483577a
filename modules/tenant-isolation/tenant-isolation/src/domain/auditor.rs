//! Violation auditor: an append-only side channel for rejected writes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tenant_isolation_sdk::{IsolationViolation, ViolationSummary};
use tracing::error;

use crate::domain::error::AuditError;

#[async_trait]
pub trait ViolationStore: Send + Sync {
    async fn append(&self, violation: &IsolationViolation) -> Result<(), AuditError>;

    /// Counts grouped by table, operation and violation type since `since`.
    async fn counts_since(&self, since: DateTime<Utc>) -> Result<Vec<ViolationSummary>, AuditError>;

    /// Latest violations, newest first.
    async fn recent(&self, limit: u64) -> Result<Vec<IsolationViolation>, AuditError>;
}

pub struct ViolationAuditor {
    store: Arc<dyn ViolationStore>,
}

impl ViolationAuditor {
    #[must_use]
    pub fn new(store: Arc<dyn ViolationStore>) -> Self {
        Self { store }
    }

    /// Append one violation. Never fails: a store error is logged with the
    /// violation's fields and swallowed so the write decision stands as made.
    pub async fn record(&self, violation: IsolationViolation) {
        if let Err(e) = self.store.append(&violation).await {
            error!(
                target: "security",
                error = %e,
                tenant_id = ?violation.tenant_id,
                user_id = ?violation.user_id,
                table = %violation.table_name,
                operation = violation.operation.as_str(),
                violation_type = violation.violation_type.as_str(),
                "failed to persist isolation violation"
            );
        }
    }

    /// Grouped counts over the last `window_days` days, most frequent first.
    ///
    /// # Errors
    /// Returns [`AuditError`] if the store cannot be read.
    pub async fn summarize(&self, window_days: u32) -> Result<Vec<ViolationSummary>, AuditError> {
        let since = Utc::now()
            .checked_sub_signed(TimeDelta::days(i64::from(window_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut rows = self.store.counts_since(since).await?;
        rows.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.table_name.cmp(&b.table_name))
                .then_with(|| a.operation.cmp(&b.operation))
                .then_with(|| a.violation_type.cmp(&b.violation_type))
        });
        Ok(rows)
    }

    /// # Errors
    /// Returns [`AuditError`] if the store cannot be read.
    pub async fn recent(&self, limit: u64) -> Result<Vec<IsolationViolation>, AuditError> {
        self.store.recent(limit).await
    }
}
