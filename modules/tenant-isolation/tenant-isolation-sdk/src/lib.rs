#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tenant Isolation SDK
//!
//! Public surface of the `tenant-isolation` module:
//!
//! - [`TenantIsolationClient`] - operator API (migrations, integrity, violations)
//! - [`TenantInfo`], [`MigrationRecord`], [`BatchResult`], [`IsolationViolation`],
//!   [`IntegrityIssue`] - models
//! - [`IsolationError`], [`TenantIsolationError`] - errors

pub mod api;
pub mod error;
pub mod models;

pub use api::TenantIsolationClient;
pub use error::{IsolationError, TenantIsolationError};
pub use models::{
    BatchReport, BatchResult, BatchSummary, FailedTenant, IntegrityIssue, IsolationViolation,
    IssueType, MigrationBatch, MigrationDirection, MigrationRecord, MigrationReport,
    MigrationResults, MigrationStatus, Severity, TenantFilter, TenantId, TenantInfo,
    TenantOutcome, TenantStatus, ViolationSummary, ViolationType, WriteOperation,
};
