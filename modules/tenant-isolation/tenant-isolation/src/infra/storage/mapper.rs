//! Entity <-> SDK model conversions.

use sea_orm::ActiveValue::Set;
use sea_orm::DbErr;
use tenant_isolation_sdk::{
    IsolationViolation, MigrationDirection, MigrationRecord, MigrationStatus, ViolationType,
    WriteOperation,
};
use uuid::Uuid;

use super::entity::{rls_violation, tenant_migration};
use crate::domain::error::AuditError;

pub fn record_to_active_model(record: &MigrationRecord) -> tenant_migration::ActiveModel {
    tenant_migration::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(record.tenant_id),
        migration_name: Set(record.migration_name.clone()),
        direction: Set(record.direction.as_str().to_owned()),
        status: Set(record.status.as_str().to_owned()),
        executed_at: Set(record.executed_at),
        error_message: Set(record.error_message.clone()),
    }
}

impl TryFrom<tenant_migration::Model> for MigrationRecord {
    type Error = DbErr;

    fn try_from(m: tenant_migration::Model) -> Result<Self, Self::Error> {
        let direction = MigrationDirection::parse(&m.direction)
            .ok_or_else(|| DbErr::Custom(format!("unknown migration direction '{}'", m.direction)))?;
        let status = MigrationStatus::parse(&m.status)
            .ok_or_else(|| DbErr::Custom(format!("unknown migration status '{}'", m.status)))?;
        Ok(Self {
            tenant_id: m.tenant_id,
            migration_name: m.migration_name,
            direction,
            status,
            executed_at: m.executed_at,
            error_message: m.error_message,
        })
    }
}

pub fn violation_to_active_model(v: &IsolationViolation) -> rls_violation::ActiveModel {
    rls_violation::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(v.tenant_id),
        user_id: Set(v.user_id),
        table_name: Set(v.table_name.clone()),
        operation: Set(v.operation.as_str().to_owned()),
        violation_type: Set(v.violation_type.as_str().to_owned()),
        original_statement: Set(v.original_statement.clone()),
        attempted_at: Set(v.attempted_at),
        ip_address: Set(v.ip_address.clone()),
        user_agent: Set(v.user_agent.clone()),
    }
}

pub fn parse_operation(s: &str) -> Result<WriteOperation, AuditError> {
    WriteOperation::parse(s).ok_or_else(|| AuditError::Corrupt(format!("operation '{s}'")))
}

pub fn parse_violation_type(s: &str) -> Result<ViolationType, AuditError> {
    ViolationType::parse(s).ok_or_else(|| AuditError::Corrupt(format!("violation type '{s}'")))
}

impl TryFrom<rls_violation::Model> for IsolationViolation {
    type Error = AuditError;

    fn try_from(m: rls_violation::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            tenant_id: m.tenant_id,
            user_id: m.user_id,
            operation: parse_operation(&m.operation)?,
            violation_type: parse_violation_type(&m.violation_type)?,
            table_name: m.table_name,
            original_statement: m.original_statement,
            attempted_at: m.attempted_at,
            ip_address: m.ip_address,
            user_agent: m.user_agent,
        })
    }
}
