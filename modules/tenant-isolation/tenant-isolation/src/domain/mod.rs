pub mod auditor;
pub mod enforcement;
pub mod error;
pub mod ledger;
pub mod local_client;
pub mod migration;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod schema;
pub mod tables;
pub mod validator;
