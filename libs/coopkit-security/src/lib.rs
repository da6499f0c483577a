#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tenant-dimension security primitives.
//!
//! - [`TenantContext`]: the tenant a unit of work acts for. It is an owned value
//!   and is carried by whatever handle owns the unit of work (a tenant session
//!   bound to one transaction), never by a process-wide or connection-wide slot.
//! - [`SystemOperation`]: the only way to run a unit of work without a tenant.
//! - [`RequestOrigin`]: who/where a write came from, copied onto audit records.

pub mod context;
pub mod origin;
pub mod system;

pub use context::{TenantContext, TenantId};
pub use origin::RequestOrigin;
pub use system::{SystemOperation, SystemOperationError};
