//! Migration units and the catalog that names them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tenant_isolation_sdk::{IsolationError, TenantId};
use thiserror::Error;

use crate::domain::enforcement::TenantSession;
use crate::domain::error::DomainError;
use crate::domain::schema::{SchemaMutationError, SchemaMutator};
use crate::domain::tables::TableRegistry;

#[derive(Debug, Error)]
pub enum MigrationUnitError {
    #[error(transparent)]
    SchemaMutation(#[from] SchemaMutationError),

    /// `down` was requested on a unit that has no safe reversal.
    #[error("migration '{name}' is not reversible")]
    NonReversible { name: String },

    #[error(transparent)]
    Isolation(#[from] IsolationError),

    /// The tenant's schema is not in a state this unit can work from.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

/// Everything a unit may touch while running for one tenant.
///
/// The session's context is already set to [`MigrationStep::tenant_id`], so data
/// written through it is tagged and policed like any other write.
pub struct MigrationStep<'a> {
    tenant_id: TenantId,
    session: &'a TenantSession<'a>,
}

impl<'a> MigrationStep<'a> {
    #[must_use]
    pub fn new(tenant_id: TenantId, session: &'a TenantSession<'a>) -> Self {
        Self { tenant_id, session }
    }

    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    #[must_use]
    pub fn schema(&self) -> SchemaMutator<'a> {
        SchemaMutator::new(self.session.transaction())
    }

    #[must_use]
    pub fn session(&self) -> &'a TenantSession<'a> {
        self.session
    }

    #[must_use]
    pub fn tables(&self) -> &'a TableRegistry {
        self.session.tables()
    }
}

/// A named schema or data change applied to one tenant at a time.
///
/// `up` and `down` must tolerate a partially applied previous run: check what
/// exists, then act. The orchestrator runs each call inside a transaction it
/// owns and commits or rolls back based on the result.
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Stable identifier, used in the ledger and on the command line.
    fn name(&self) -> &str;

    fn version(&self) -> u32 {
        1
    }

    /// Whether `down` is implemented. Checked before any transaction is opened.
    fn reversible(&self) -> bool {
        false
    }

    async fn up(&self, step: &MigrationStep<'_>) -> Result<(), MigrationUnitError>;

    async fn down(&self, _step: &MigrationStep<'_>) -> Result<(), MigrationUnitError> {
        Err(MigrationUnitError::NonReversible {
            name: self.name().to_owned(),
        })
    }
}

/// Migration units by name.
#[derive(Default, Clone)]
pub struct MigrationCatalog {
    units: BTreeMap<String, Arc<dyn MigrationUnit>>,
}

impl MigrationCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns [`DomainError::DuplicateMigration`] if the name is taken.
    pub fn register(&mut self, unit: Arc<dyn MigrationUnit>) -> Result<(), DomainError> {
        let name = unit.name().to_owned();
        if self.units.contains_key(&name) {
            return Err(DomainError::DuplicateMigration(name));
        }
        self.units.insert(name, unit);
        Ok(())
    }

    /// # Errors
    /// Returns [`DomainError::DuplicateMigration`] if the name is taken.
    pub fn with(mut self, unit: Arc<dyn MigrationUnit>) -> Result<Self, DomainError> {
        self.register(unit)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn MigrationUnit>> {
        self.units.get(name).cloned()
    }

    /// Look up every name, failing on the first unknown one.
    ///
    /// # Errors
    /// Returns [`DomainError::UnknownMigration`].
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn MigrationUnit>>, DomainError> {
        names
            .iter()
            .map(|n| {
                self.get(n)
                    .ok_or_else(|| DomainError::UnknownMigration(n.clone()))
            })
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }
}
