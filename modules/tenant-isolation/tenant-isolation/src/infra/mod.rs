pub mod registry;
pub mod storage;

pub use registry::StaticTenantRegistry;
