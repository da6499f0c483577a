//! Domain models for the tenant isolation module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use coopkit_security::TenantId;

/// Tenant lifecycle status as reported by the tenant registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

/// A tenant as seen by this module. Only `id` and `status` drive behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantInfo {
    pub id: TenantId,
    pub slug: String,
    pub status: TenantStatus,
}

/// Filter for listing tenants. An empty `status` list matches every tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantFilter {
    #[serde(default)]
    pub status: Vec<TenantStatus>,
}

impl TenantFilter {
    /// Only tenants with `status = active`.
    #[must_use]
    pub fn active() -> Self {
        Self {
            status: vec![TenantStatus::Active],
        }
    }

    #[must_use]
    pub fn matches(&self, tenant: &TenantInfo) -> bool {
        self.status.is_empty() || self.status.contains(&tenant.status)
    }
}

/// Which half of a migration unit ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    Up,
    Down,
}

impl MigrationDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Success,
    Failed,
}

impl MigrationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One persisted attempt of one migration on one tenant. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub tenant_id: TenantId,
    pub migration_name: String,
    pub direction: MigrationDirection,
    pub status: MigrationStatus,
    pub executed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Result of one per-tenant attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantOutcome {
    pub tenant_id: TenantId,
    pub migration_name: String,
    pub direction: MigrationDirection,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TenantOutcome {
    #[must_use]
    pub fn succeeded(tenant_id: TenantId, migration_name: &str, direction: MigrationDirection) -> Self {
        Self {
            tenant_id,
            migration_name: migration_name.to_owned(),
            direction,
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(
        tenant_id: TenantId,
        migration_name: &str,
        direction: MigrationDirection,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            migration_name: migration_name.to_owned(),
            direction,
            success: false,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn status(&self) -> MigrationStatus {
        if self.success {
            MigrationStatus::Success
        } else {
            MigrationStatus::Failed
        }
    }
}

/// Outcomes of one migration name across the tenants of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationBatch {
    pub name: String,
    pub outcomes: Vec<TenantOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Aggregate of one orchestrator run. Transient; handed to a report sink.
///
/// `migrations` is in execution order; each entry lists outcomes in the order
/// the registry returned the tenants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub direction: MigrationDirection,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub migrations: Vec<MigrationBatch>,
}

impl BatchResult {
    pub fn outcomes(&self) -> impl Iterator<Item = &TenantOutcome> {
        self.migrations.iter().flat_map(|m| m.outcomes.iter())
    }

    /// Counts over every tenant attempt in the batch.
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let (successful, failed) = self.outcomes().fold((0, 0), |(ok, err), o| {
            if o.success { (ok + 1, err) } else { (ok, err + 1) }
        });
        BatchSummary {
            total: successful + failed,
            successful,
            failed,
        }
    }

    /// `false` when any tenant attempt failed and manual intervention is needed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes().all(|o| o.success)
    }

    #[must_use]
    pub fn failed(&self) -> Vec<&TenantOutcome> {
        self.outcomes().filter(|o| !o.success).collect()
    }

    #[must_use]
    pub fn report(&self) -> BatchReport {
        BatchReport {
            batch_id: self.batch_id,
            direction: self.direction,
            started_at: self.started_at,
            completed_at: self.completed_at,
            migrations: self
                .migrations
                .iter()
                .map(|m| MigrationReport {
                    name: m.name.clone(),
                    results: MigrationResults {
                        success: m
                            .outcomes
                            .iter()
                            .filter(|o| o.success)
                            .map(|o| o.tenant_id)
                            .collect(),
                        failed: m
                            .outcomes
                            .iter()
                            .filter(|o| !o.success)
                            .map(|o| FailedTenant {
                                tenant_id: o.tenant_id,
                                error: o.error.clone().unwrap_or_default(),
                            })
                            .collect(),
                    },
                })
                .collect(),
            summary: self.summary(),
        }
    }
}

/// Serialized form of a finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub direction: MigrationDirection,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub migrations: Vec<MigrationReport>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub name: String,
    pub results: MigrationResults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResults {
    pub success: Vec<TenantId>,
    pub failed: Vec<FailedTenant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTenant {
    pub tenant_id: TenantId,
    pub error: String,
}

/// A write kind policed by the enforcement layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOperation {
    Insert,
    Update,
    Delete,
}

impl WriteOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// A write on an isolation-required table with no tenant context.
    MissingContext,
    /// A write that targeted, or supplied, another tenant's id.
    CrossTenantWrite,
    /// An update that tried to change a row's own tenant id.
    TenantReassignment,
}

impl ViolationType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingContext => "missing_context",
            Self::CrossTenantWrite => "cross_tenant_write",
            Self::TenantReassignment => "tenant_reassignment",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "missing_context" => Some(Self::MissingContext),
            "cross_tenant_write" => Some(Self::CrossTenantWrite),
            "tenant_reassignment" => Some(Self::TenantReassignment),
            _ => None,
        }
    }
}

/// A rejected or suspicious write. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationViolation {
    pub tenant_id: Option<TenantId>,
    pub user_id: Option<Uuid>,
    pub table_name: String,
    pub operation: WriteOperation,
    pub violation_type: ViolationType,
    /// Short description of the attempted write, never bound values.
    pub original_statement: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Grouped violation count for security reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub table_name: String,
    pub operation: WriteOperation,
    pub violation_type: ViolationType,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MissingTenantId,
    OrphanedReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

/// A finding of the integrity validator. Not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub table: String,
    pub issue_type: IssueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_table: Option<String>,
    pub count: u64,
    pub severity: Severity,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn outcome(success: bool, name: &str) -> TenantOutcome {
        if success {
            TenantOutcome::succeeded(Uuid::new_v4(), name, MigrationDirection::Up)
        } else {
            TenantOutcome::failed(Uuid::new_v4(), name, MigrationDirection::Up, "connection refused")
        }
    }

    fn batch(migrations: Vec<MigrationBatch>) -> BatchResult {
        let now = Utc::now();
        BatchResult {
            batch_id: Uuid::new_v4(),
            direction: MigrationDirection::Up,
            started_at: now,
            completed_at: now,
            migrations,
        }
    }

    #[test]
    fn summary_counts_every_attempt() {
        let result = batch(vec![
            MigrationBatch {
                name: "a".to_owned(),
                outcomes: vec![outcome(true, "a"), outcome(false, "a"), outcome(true, "a")],
            },
            MigrationBatch {
                name: "b".to_owned(),
                outcomes: vec![outcome(true, "b")],
            },
        ]);
        let s = result.summary();
        assert_eq!(s.total, 4);
        assert_eq!(s.successful, 3);
        assert_eq!(s.failed, 1);
        assert_eq!(s.successful + s.failed, s.total);
        assert!(!result.is_complete());
        assert_eq!(result.failed().len(), 1);
    }

    #[test]
    fn empty_batch_is_complete() {
        let result = batch(vec![]);
        assert_eq!(result.summary(), BatchSummary::default());
        assert!(result.is_complete());
    }

    #[test]
    fn report_has_documented_shape() {
        let ok = outcome(true, "AddTenantIdColumns");
        let bad = outcome(false, "AddTenantIdColumns");
        let result = batch(vec![MigrationBatch {
            name: "AddTenantIdColumns".to_owned(),
            outcomes: vec![ok.clone(), bad.clone()],
        }]);

        let json = serde_json::to_value(result.report()).unwrap();
        assert_eq!(json["migrations"][0]["name"], "AddTenantIdColumns");
        assert_eq!(
            json["migrations"][0]["results"]["success"][0],
            ok.tenant_id.to_string()
        );
        assert_eq!(
            json["migrations"][0]["results"]["failed"][0]["tenant_id"],
            bad.tenant_id.to_string()
        );
        assert_eq!(
            json["migrations"][0]["results"]["failed"][0]["error"],
            "connection refused"
        );
        assert_eq!(json["summary"]["total"], 2);
        assert_eq!(json["summary"]["successful"], 1);
        assert_eq!(json["summary"]["failed"], 1);
        assert!(json.get("batch_id").is_some());
        assert!(json.get("started_at").is_some());
        assert!(json.get("completed_at").is_some());
    }

    #[test]
    fn filter_matches_by_status() {
        let tenant = TenantInfo {
            id: Uuid::new_v4(),
            slug: "riverside".to_owned(),
            status: TenantStatus::Suspended,
        };
        assert!(!TenantFilter::active().matches(&tenant));
        assert!(TenantFilter::default().matches(&tenant));
    }

    #[test]
    fn string_codes_parse_back() {
        for op in [WriteOperation::Insert, WriteOperation::Update, WriteOperation::Delete] {
            assert_eq!(WriteOperation::parse(op.as_str()), Some(op));
        }
        for vt in [
            ViolationType::MissingContext,
            ViolationType::CrossTenantWrite,
            ViolationType::TenantReassignment,
        ] {
            assert_eq!(ViolationType::parse(vt.as_str()), Some(vt));
        }
        assert_eq!(MigrationStatus::parse("failed"), Some(MigrationStatus::Failed));
        assert_eq!(MigrationDirection::parse("sideways"), None);
    }

    #[test]
    fn issue_serializes_snake_case() {
        let issue = IntegrityIssue {
            table: "loans".to_owned(),
            issue_type: IssueType::OrphanedReference,
            related_table: Some("members".to_owned()),
            count: 3,
            severity: Severity::Medium,
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["issue_type"], "orphaned_reference");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["related_table"], "members");
    }
}
