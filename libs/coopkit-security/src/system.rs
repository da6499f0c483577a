use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SystemOperationError {
    #[error("system operation requires a non-empty reason")]
    MissingReason,
}

/// Capability to act without a tenant.
///
/// Holding a `SystemOperation` is what distinguishes an administrative unit of
/// work from one that simply forgot to set a tenant. It can only be created
/// through [`SystemOperation::begin`], which demands a reason and leaves a
/// WARN-level trace on the `security` target. It serializes for audit output
/// but never deserializes:
///
/// ```compile_fail
/// let op: coopkit_security::SystemOperation = serde_json::from_str(
///     r#"{"id":"00000000-0000-0000-0000-000000000000","reason":"","started_at":"2020-01-01T00:00:00Z"}"#,
/// ).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemOperation {
    id: Uuid,
    reason: String,
    started_at: DateTime<Utc>,
}

impl SystemOperation {
    /// Start a system operation.
    ///
    /// # Errors
    /// Returns [`SystemOperationError::MissingReason`] when `reason` is blank.
    pub fn begin(reason: &str) -> Result<Self, SystemOperationError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SystemOperationError::MissingReason);
        }
        let op = Self {
            id: Uuid::new_v4(),
            reason: reason.to_owned(),
            started_at: Utc::now(),
        };
        tracing::warn!(
            target: "security",
            operation_id = %op.id,
            reason = %op.reason,
            "system operation started, tenant isolation relaxed for this unit of work"
        );
        Ok(op)
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
