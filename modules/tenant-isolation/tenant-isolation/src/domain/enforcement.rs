//! Row-level tenant isolation for writes.
//!
//! A [`TenantSession`] wraps one open transaction together with the
//! [`TenantContext`] of the unit of work running on it. Every insert, update and
//! delete on a tenant-scoped entity goes through [`decide`] before any SQL is
//! issued; rejected writes never reach the database and are reported to the
//! [`ViolationAuditor`] on its own connection.
//!
//! ```ignore
//! let txn = db.begin().await?;
//! let mut session = guard.session(&txn);
//! session.set_tenant_context(tenant_id);
//! let loan = session.insert::<loan::Entity>(loan::ActiveModel { .. }).await?;
//! drop(session);
//! txn.commit().await?;
//! ```

use std::sync::Arc;

use chrono::Utc;
use coopkit_security::{RequestOrigin, SystemOperation, TenantContext};
use sea_orm::sea_query::ValueType;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ActiveValue, ColumnTrait, Condition,
    DatabaseTransaction, DbErr, EntityTrait, IntoActiveModel, Iterable, ModelTrait,
    PrimaryKeyToColumn, QueryFilter, Select, Value,
};
use tenant_isolation_sdk::{
    IsolationError, IsolationViolation, TenantId, ViolationType, WriteOperation,
};
use tracing::warn;
use uuid::Uuid;

use crate::domain::auditor::ViolationAuditor;
use crate::domain::tables::TableRegistry;

/// Entities that carry an owning-tenant column.
///
/// Entities returning `None` are global and pass through the session
/// unchecked, as do entities whose table is registered as exempt.
pub trait TenantScopedEntity: EntityTrait {
    fn tenant_col() -> Option<Self::Column>;
}

/// The tenant column's value as seen on an active model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantValue {
    /// Not part of the write.
    Unset,
    /// Explicitly set to NULL.
    Null,
    Set(TenantId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Allow, after setting the tenant column to the given tenant.
    AutoFill(TenantId),
    Reject {
        error: IsolationError,
        violation: ViolationType,
    },
}

/// The enforcement state machine.
///
/// `stored` is the owning tenant of the existing row for update and delete
/// (`None` when that row has no owner yet) and is ignored for insert.
#[must_use]
pub fn decide(
    operation: WriteOperation,
    table: &str,
    context: &TenantContext,
    isolation_required: bool,
    supplied: TenantValue,
    stored: Option<TenantId>,
) -> Decision {
    if !isolation_required {
        return Decision::Allow;
    }

    let context_required = || Decision::Reject {
        error: IsolationError::TenantContextRequired {
            table: table.to_owned(),
            operation,
        },
        violation: ViolationType::MissingContext,
    };
    let cross_tenant = |context_tenant: TenantId, row_tenant: Option<TenantId>| Decision::Reject {
        error: IsolationError::CrossTenantAccess {
            table: table.to_owned(),
            operation,
            context_tenant,
            row_tenant,
        },
        violation: ViolationType::CrossTenantWrite,
    };
    let reassignment = |to: Option<TenantId>| Decision::Reject {
        error: IsolationError::TenantReassignment {
            table: table.to_owned(),
            from: stored,
            to,
        },
        violation: ViolationType::TenantReassignment,
    };
    let reassigns = match supplied {
        TenantValue::Unset => None,
        TenantValue::Null => stored.is_some().then_some(None),
        TenantValue::Set(t) => (stored != Some(t)).then_some(Some(t)),
    };

    // a row never changes owner, whatever the context
    if let (WriteOperation::Update, Some(to)) = (operation, reassigns) {
        return reassignment(to);
    }

    match (operation, context) {
        (_, TenantContext::Absent) => context_required(),

        (WriteOperation::Insert, TenantContext::Tenant { tenant_id }) => match supplied {
            TenantValue::Unset | TenantValue::Null => Decision::AutoFill(*tenant_id),
            TenantValue::Set(t) if t == *tenant_id => Decision::Allow,
            TenantValue::Set(t) => cross_tenant(*tenant_id, Some(t)),
        },
        (WriteOperation::Insert, TenantContext::System { .. }) => match supplied {
            TenantValue::Set(_) => Decision::Allow,
            TenantValue::Unset | TenantValue::Null => context_required(),
        },

        (WriteOperation::Update | WriteOperation::Delete, TenantContext::Tenant { tenant_id })
            if stored != Some(*tenant_id) =>
        {
            cross_tenant(*tenant_id, stored)
        }
        (
            WriteOperation::Update | WriteOperation::Delete,
            TenantContext::Tenant { .. } | TenantContext::System { .. },
        ) => Decision::Allow,
    }
}

fn db_err(e: &DbErr) -> IsolationError {
    IsolationError::Database(e.to_string())
}

fn table_name<E: EntityTrait>() -> String {
    E::default().table_name().to_owned()
}

fn tenant_from_value(table: &str, value: Value) -> Result<Option<TenantId>, IsolationError> {
    <Option<Uuid> as ValueType>::try_from(value).map_err(|_| {
        IsolationError::Database(format!("tenant column of '{table}' does not hold a UUID"))
    })
}

fn tenant_value(table: &str, value: ActiveValue<Value>) -> Result<TenantValue, IsolationError> {
    match value {
        ActiveValue::NotSet => Ok(TenantValue::Unset),
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Ok(match tenant_from_value(table, v)? {
            Some(t) => TenantValue::Set(t),
            None => TenantValue::Null,
        }),
    }
}

/// Shared enforcement configuration: which tables are policed and where
/// violations go. Cheap to share; open one [`TenantSession`] per transaction.
pub struct IsolationGuard {
    tables: Arc<TableRegistry>,
    auditor: Arc<ViolationAuditor>,
}

impl IsolationGuard {
    #[must_use]
    pub fn new(tables: Arc<TableRegistry>, auditor: Arc<ViolationAuditor>) -> Self {
        Self { tables, auditor }
    }

    #[must_use]
    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    #[must_use]
    pub fn auditor(&self) -> &Arc<ViolationAuditor> {
        &self.auditor
    }

    /// Session with no tenant context. Writes to isolated tables are rejected
    /// until a tenant is set or a system operation is entered.
    #[must_use]
    pub fn session<'a>(&'a self, txn: &'a DatabaseTransaction) -> TenantSession<'a> {
        TenantSession {
            guard: self,
            txn,
            context: TenantContext::Absent,
            origin: RequestOrigin::default(),
        }
    }

    #[must_use]
    pub fn session_for<'a>(
        &'a self,
        txn: &'a DatabaseTransaction,
        tenant_id: TenantId,
    ) -> TenantSession<'a> {
        let mut session = self.session(txn);
        session.set_tenant_context(tenant_id);
        session
    }
}

/// One unit of work: one transaction, one tenant context.
///
/// The context lives only in this value. Dropping the session clears it.
pub struct TenantSession<'a> {
    guard: &'a IsolationGuard,
    txn: &'a DatabaseTransaction,
    context: TenantContext,
    origin: RequestOrigin,
}

impl<'a> TenantSession<'a> {
    pub fn set_tenant_context(&mut self, tenant_id: TenantId) {
        self.context.set(tenant_id);
    }

    pub fn clear_tenant_context(&mut self) {
        self.context.clear();
    }

    #[must_use]
    pub fn tenant_context(&self) -> &TenantContext {
        &self.context
    }

    /// Switch this session to administrative mode.
    pub fn enter_system_operation(&mut self, operation: SystemOperation) {
        warn!(
            target: "security",
            operation_id = %operation.id(),
            reason = operation.reason(),
            "tenant session entered system operation"
        );
        self.context.enter_system(operation);
    }

    #[must_use]
    pub fn with_origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn transaction(&self) -> &'a DatabaseTransaction {
        self.txn
    }

    #[must_use]
    pub fn tables(&self) -> &'a TableRegistry {
        self.guard.tables()
    }

    /// Insert a row, filling the tenant column from context when it is unset.
    ///
    /// # Errors
    /// Any [`IsolationError`] rejection, or `Database` if the insert fails.
    pub async fn insert<E>(&self, mut am: E::ActiveModel) -> Result<E::Model, IsolationError>
    where
        E: TenantScopedEntity,
        E::Model: IntoActiveModel<E::ActiveModel>,
        E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    {
        if let Some(col) = E::tenant_col() {
            let table = table_name::<E>();
            let isolation_required = self.isolation_required(&table)?;
            let supplied = tenant_value(&table, am.get(col))?;
            match decide(
                WriteOperation::Insert,
                &table,
                &self.context,
                isolation_required,
                supplied,
                None,
            ) {
                Decision::Allow => {}
                Decision::AutoFill(tenant_id) => am.set(col, Value::from(tenant_id)),
                Decision::Reject { error, violation } => {
                    return Err(self.reject(&table, WriteOperation::Insert, error, violation).await);
                }
            }
        }
        am.insert(self.txn).await.map_err(|e| db_err(&e))
    }

    /// Update a row identified by the model's primary key.
    ///
    /// # Errors
    /// Any [`IsolationError`] rejection, `RowNotFound`, `MissingPrimaryKey`, or
    /// `Database` if the update fails.
    pub async fn update<E>(&self, am: E::ActiveModel) -> Result<E::Model, IsolationError>
    where
        E: TenantScopedEntity,
        E::Model: IntoActiveModel<E::ActiveModel>,
        E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    {
        let Some(col) = self.policed_column::<E>()? else {
            return E::update(am).exec(self.txn).await.map_err(|e| db_err(&e));
        };
        let table = table_name::<E>();
        let stored = self.stored_tenant::<E>(&am, col, WriteOperation::Update).await?;
        let supplied = match am.get(col) {
            ActiveValue::Set(v) => tenant_value(&table, ActiveValue::Set(v))?,
            ActiveValue::Unchanged(_) | ActiveValue::NotSet => TenantValue::Unset,
        };
        self.check(&table, WriteOperation::Update, supplied, stored).await?;

        let mut query = E::update(am);
        if let Some(tenant_id) = self.context.get() {
            query = query.filter(col.eq(tenant_id));
        }
        query.exec(self.txn).await.map_err(|e| db_err(&e))
    }

    /// Delete a row identified by the model's primary key. Returns rows affected.
    ///
    /// # Errors
    /// Any [`IsolationError`] rejection, `RowNotFound`, `MissingPrimaryKey`, or
    /// `Database` if the delete fails.
    pub async fn delete<E>(&self, am: E::ActiveModel) -> Result<u64, IsolationError>
    where
        E: TenantScopedEntity,
        E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    {
        let Some(col) = self.policed_column::<E>()? else {
            let res = E::delete(am).exec(self.txn).await.map_err(|e| db_err(&e))?;
            return Ok(res.rows_affected);
        };
        let table = table_name::<E>();
        let stored = self.stored_tenant::<E>(&am, col, WriteOperation::Delete).await?;
        self.check(&table, WriteOperation::Delete, TenantValue::Unset, stored)
            .await?;

        let mut query = E::delete(am);
        if let Some(tenant_id) = self.context.get() {
            query = query.filter(col.eq(tenant_id));
        }
        let res = query.exec(self.txn).await.map_err(|e| db_err(&e))?;
        Ok(res.rows_affected)
    }

    /// `SELECT` restricted to the context tenant's rows.
    ///
    /// System operations see every row; exempt and global entities are not filtered.
    ///
    /// # Errors
    /// `ReadContextRequired` on an isolated table with no context,
    /// `UnregisteredTable` for an unknown tenant-scoped table.
    pub fn select<E: TenantScopedEntity>(&self) -> Result<Select<E>, IsolationError> {
        let query = E::find();
        let Some(col) = self.policed_column::<E>()? else {
            return Ok(query);
        };
        match &self.context {
            TenantContext::Tenant { tenant_id } => Ok(query.filter(col.eq(*tenant_id))),
            TenantContext::System { .. } => Ok(query),
            TenantContext::Absent => Err(IsolationError::ReadContextRequired {
                table: table_name::<E>(),
            }),
        }
    }

    fn isolation_required(&self, table: &str) -> Result<bool, IsolationError> {
        self.guard
            .tables()
            .policy(table)
            .map(|p| p.isolation_required)
            .ok_or_else(|| IsolationError::UnregisteredTable {
                table: table.to_owned(),
            })
    }

    /// Tenant column of `E` if writes to it must be checked.
    fn policed_column<E: TenantScopedEntity>(&self) -> Result<Option<E::Column>, IsolationError> {
        match E::tenant_col() {
            Some(col) if self.isolation_required(&table_name::<E>())? => Ok(Some(col)),
            _ => Ok(None),
        }
    }

    async fn stored_tenant<E>(
        &self,
        am: &E::ActiveModel,
        col: E::Column,
        operation: WriteOperation,
    ) -> Result<Option<TenantId>, IsolationError>
    where
        E: TenantScopedEntity,
        E::ActiveModel: ActiveModelTrait<Entity = E>,
    {
        let table = table_name::<E>();
        let mut by_key = Condition::all();
        for key in E::PrimaryKey::iter() {
            let key_col = key.into_column();
            match am.get(key_col) {
                ActiveValue::Set(v) | ActiveValue::Unchanged(v) => {
                    by_key = by_key.add(key_col.eq(v));
                }
                ActiveValue::NotSet => {
                    return Err(IsolationError::MissingPrimaryKey { table, operation });
                }
            }
        }
        let existing = E::find()
            .filter(by_key)
            .one(self.txn)
            .await
            .map_err(|e| db_err(&e))?
            .ok_or_else(|| IsolationError::RowNotFound {
                table: table.clone(),
                operation,
            })?;
        tenant_from_value(&table, existing.get(col))
    }

    async fn check(
        &self,
        table: &str,
        operation: WriteOperation,
        supplied: TenantValue,
        stored: Option<TenantId>,
    ) -> Result<(), IsolationError> {
        match decide(operation, table, &self.context, true, supplied, stored) {
            Decision::Allow | Decision::AutoFill(_) => Ok(()),
            Decision::Reject { error, violation } => {
                Err(self.reject(table, operation, error, violation).await)
            }
        }
    }

    async fn reject(
        &self,
        table: &str,
        operation: WriteOperation,
        error: IsolationError,
        violation_type: ViolationType,
    ) -> IsolationError {
        warn!(
            target: "security",
            table,
            operation = operation.as_str(),
            violation_type = violation_type.as_str(),
            tenant_id = ?self.context.get(),
            user_id = ?self.origin.user_id,
            error = %error,
            "tenant isolation rejected write"
        );
        self.guard
            .auditor()
            .record(IsolationViolation {
                tenant_id: self.context.get(),
                user_id: self.origin.user_id,
                table_name: table.to_owned(),
                operation,
                violation_type,
                original_statement: Some(format!("{} {table}", operation.as_str().to_uppercase())),
                attempted_at: Utc::now(),
                ip_address: self.origin.ip_address.clone(),
                user_agent: self.origin.user_agent.clone(),
            })
            .await;
        error
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn tenant() -> TenantContext {
        TenantContext::for_tenant(Uuid::new_v4())
    }

    fn system() -> TenantContext {
        TenantContext::system(SystemOperation::begin("test").unwrap())
    }

    fn violation(d: &Decision) -> Option<ViolationType> {
        match d {
            Decision::Reject { violation, .. } => Some(*violation),
            Decision::Allow | Decision::AutoFill(_) => None,
        }
    }

    #[test]
    fn exempt_tables_always_pass() {
        for op in [WriteOperation::Insert, WriteOperation::Update, WriteOperation::Delete] {
            let d = decide(op, "rates", &TenantContext::Absent, false, TenantValue::Unset, None);
            assert_eq!(d, Decision::Allow);
        }
    }

    #[test]
    fn absent_context_is_rejected_for_every_write() {
        for op in [WriteOperation::Insert, WriteOperation::Update, WriteOperation::Delete] {
            let d = decide(op, "loans", &TenantContext::Absent, true, TenantValue::Unset, None);
            assert!(matches!(
                d,
                Decision::Reject {
                    error: IsolationError::TenantContextRequired { .. },
                    violation: ViolationType::MissingContext,
                }
            ));
        }
    }

    #[test]
    fn insert_auto_fills_keeps_matching_and_rejects_conflicting() {
        let ctx = tenant();
        let a = ctx.get().unwrap();

        let d = decide(WriteOperation::Insert, "loans", &ctx, true, TenantValue::Unset, None);
        assert_eq!(d, Decision::AutoFill(a));
        let d = decide(WriteOperation::Insert, "loans", &ctx, true, TenantValue::Null, None);
        assert_eq!(d, Decision::AutoFill(a));
        let d = decide(WriteOperation::Insert, "loans", &ctx, true, TenantValue::Set(a), None);
        assert_eq!(d, Decision::Allow);

        let b = Uuid::new_v4();
        let d = decide(WriteOperation::Insert, "loans", &ctx, true, TenantValue::Set(b), None);
        assert_eq!(violation(&d), Some(ViolationType::CrossTenantWrite));
    }

    #[test]
    fn update_and_delete_of_foreign_rows_are_cross_tenant() {
        let ctx = tenant();
        let b = Uuid::new_v4();
        for op in [WriteOperation::Update, WriteOperation::Delete] {
            let d = decide(op, "loans", &ctx, true, TenantValue::Unset, Some(b));
            match d {
                Decision::Reject {
                    error: IsolationError::CrossTenantAccess { row_tenant, .. },
                    violation: ViolationType::CrossTenantWrite,
                } => assert_eq!(row_tenant, Some(b)),
                other => panic!("unexpected decision {other:?}"),
            }
        }
        // rows with no owner are not the context tenant's either
        let d = decide(WriteOperation::Update, "loans", &ctx, true, TenantValue::Unset, None);
        assert_eq!(violation(&d), Some(ViolationType::CrossTenantWrite));
    }

    #[test]
    fn own_rows_update_and_delete() {
        let ctx = tenant();
        let a = ctx.get().unwrap();
        let d = decide(WriteOperation::Update, "loans", &ctx, true, TenantValue::Unset, Some(a));
        assert_eq!(d, Decision::Allow);
        let d = decide(WriteOperation::Update, "loans", &ctx, true, TenantValue::Set(a), Some(a));
        assert_eq!(d, Decision::Allow);
        let d = decide(WriteOperation::Delete, "loans", &ctx, true, TenantValue::Unset, Some(a));
        assert_eq!(d, Decision::Allow);
    }

    #[test]
    fn reassignment_is_rejected_under_tenant_and_system() {
        let ctx = tenant();
        let a = ctx.get().unwrap();
        let b = Uuid::new_v4();

        let d = decide(WriteOperation::Update, "loans", &TenantContext::Absent, true, TenantValue::Set(b), Some(a));
        match d {
            Decision::Reject {
                error: IsolationError::TenantReassignment { from, to, .. },
                violation: ViolationType::TenantReassignment,
            } => {
                assert_eq!(from, Some(a));
                assert_eq!(to, Some(b));
            }
            other => panic!("unexpected decision {other:?}"),
        }
        // a foreign row moved elsewhere is still a reassignment first
        let c = Uuid::new_v4();
        let d = decide(WriteOperation::Update, "loans", &ctx, true, TenantValue::Set(c), Some(b));
        assert_eq!(violation(&d), Some(ViolationType::TenantReassignment));

        let d = decide(WriteOperation::Update, "loans", &ctx, true, TenantValue::Set(b), Some(a));
        assert_eq!(violation(&d), Some(ViolationType::TenantReassignment));
        let d = decide(WriteOperation::Update, "loans", &ctx, true, TenantValue::Null, Some(a));
        assert_eq!(violation(&d), Some(ViolationType::TenantReassignment));

        let d = decide(WriteOperation::Update, "loans", &system(), true, TenantValue::Set(b), Some(a));
        match d {
            Decision::Reject {
                error: IsolationError::TenantReassignment { from, to, .. },
                ..
            } => {
                assert_eq!(from, Some(a));
                assert_eq!(to, Some(b));
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn system_mode_skips_tenant_filtering() {
        let ctx = system();
        let b = Uuid::new_v4();
        let d = decide(WriteOperation::Update, "loans", &ctx, true, TenantValue::Unset, Some(b));
        assert_eq!(d, Decision::Allow);
        let d = decide(WriteOperation::Delete, "loans", &ctx, true, TenantValue::Unset, Some(b));
        assert_eq!(d, Decision::Allow);
        let d = decide(WriteOperation::Insert, "loans", &ctx, true, TenantValue::Set(b), None);
        assert_eq!(d, Decision::Allow);
        // system inserts must still name an owner
        let d = decide(WriteOperation::Insert, "loans", &ctx, true, TenantValue::Unset, None);
        assert_eq!(violation(&d), Some(ViolationType::MissingContext));
    }
}
