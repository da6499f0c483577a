//! Declarative registry of tenant-owned tables.
//!
//! The same registry tells the built-in migrations which tables to alter, the
//! enforcement layer which writes to police, and the validator which tables to
//! sweep.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_TENANT_COLUMN: &str = "tenant_id";
pub const DEFAULT_PARENT_KEY: &str = "id";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableRegistryError {
    #[error("invalid {what} identifier '{value}'")]
    InvalidIdentifier { what: &'static str, value: String },

    #[error("table '{0}' registered twice")]
    DuplicateTable(String),

    #[error("table '{table}' references unregistered parent '{parent}'")]
    UnknownParent { table: String, parent: String },

    #[error("table '{0}' declares parent references but is exempt from isolation")]
    ReferenceOnExemptTable(String),
}

fn default_parent_key() -> String {
    DEFAULT_PARENT_KEY.to_owned()
}

/// A child-to-parent foreign key the validator checks for cross-tenant orphans.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParentReference {
    pub column: String,
    pub parent_table: String,
    #[serde(default = "default_parent_key")]
    pub parent_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TablePolicy {
    pub isolation_required: bool,
    pub tenant_column: String,
    pub references: Vec<ParentReference>,
}

impl Default for TablePolicy {
    fn default() -> Self {
        Self::isolated()
    }
}

impl TablePolicy {
    #[must_use]
    pub fn isolated() -> Self {
        Self {
            isolation_required: true,
            tenant_column: DEFAULT_TENANT_COLUMN.to_owned(),
            references: Vec::new(),
        }
    }

    /// Shared table (lookup data, platform config). Writes pass through.
    #[must_use]
    pub fn exempt() -> Self {
        Self {
            isolation_required: false,
            ..Self::isolated()
        }
    }

    #[must_use]
    pub fn with_tenant_column(mut self, column: &str) -> Self {
        column.clone_into(&mut self.tenant_column);
        self
    }

    #[must_use]
    pub fn references(mut self, column: &str, parent_table: &str) -> Self {
        self.references.push(ParentReference {
            column: column.to_owned(),
            parent_table: parent_table.to_owned(),
            parent_key: default_parent_key(),
        });
        self
    }
}

/// Validated, immutable set of table policies keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRegistry {
    tables: BTreeMap<String, TablePolicy>,
}

#[derive(Debug, Default)]
pub struct TableRegistryBuilder {
    entries: Vec<(String, TablePolicy)>,
}

impl TableRegistryBuilder {
    #[must_use]
    pub fn table(mut self, name: &str, policy: TablePolicy) -> Self {
        self.entries.push((name.to_owned(), policy));
        self
    }

    /// # Errors
    /// See [`TableRegistry::new`].
    pub fn build(self) -> Result<TableRegistry, TableRegistryError> {
        TableRegistry::new(self.entries)
    }
}

fn check_ident(what: &'static str, value: &str) -> Result<(), TableRegistryError> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(TableRegistryError::InvalidIdentifier {
            what,
            value: value.to_owned(),
        })
    }
}

impl TableRegistry {
    #[must_use]
    pub fn builder() -> TableRegistryBuilder {
        TableRegistryBuilder::default()
    }

    /// Build and validate a registry.
    ///
    /// # Errors
    /// Rejects non-identifier names, duplicate tables, references on exempt
    /// tables, and references to tables that are not registered.
    pub fn new(
        entries: impl IntoIterator<Item = (String, TablePolicy)>,
    ) -> Result<Self, TableRegistryError> {
        let mut tables = BTreeMap::new();
        for (name, policy) in entries {
            check_ident("table", &name)?;
            check_ident("tenant column", &policy.tenant_column)?;
            for r in &policy.references {
                check_ident("reference column", &r.column)?;
                check_ident("parent table", &r.parent_table)?;
                check_ident("parent key", &r.parent_key)?;
            }
            if !policy.isolation_required && !policy.references.is_empty() {
                return Err(TableRegistryError::ReferenceOnExemptTable(name));
            }
            if tables.contains_key(&name) {
                return Err(TableRegistryError::DuplicateTable(name));
            }
            tables.insert(name, policy);
        }

        for (name, policy) in &tables {
            if let Some(r) = policy
                .references
                .iter()
                .find(|r| !tables.contains_key(&r.parent_table))
            {
                return Err(TableRegistryError::UnknownParent {
                    table: name.clone(),
                    parent: r.parent_table.clone(),
                });
            }
        }

        Ok(Self { tables })
    }

    #[must_use]
    pub fn policy(&self, table: &str) -> Option<&TablePolicy> {
        self.tables.get(table)
    }

    #[must_use]
    pub fn requires_isolation(&self, table: &str) -> bool {
        self.policy(table).is_some_and(|p| p.isolation_required)
    }

    /// Isolation-required tables in name order.
    pub fn isolated_tables(&self) -> impl Iterator<Item = (&str, &TablePolicy)> {
        self.tables
            .iter()
            .filter(|(_, p)| p.isolation_required)
            .map(|(n, p)| (n.as_str(), p))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
