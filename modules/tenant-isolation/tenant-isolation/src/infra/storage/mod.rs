//! Control-plane storage: migration ledger and violation log.

pub mod entity;
pub mod ledger_repo;
pub mod mapper;
pub mod migrations;
pub mod violation_repo;

pub use ledger_repo::SeaOrmMigrationLedger;
pub use violation_repo::SeaOrmViolationStore;
