use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TenantMigrations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TenantMigrations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(TenantMigrations::TenantId).uuid().not_null())
                    .col(ColumnDef::new(TenantMigrations::MigrationName).string().not_null())
                    .col(ColumnDef::new(TenantMigrations::Direction).string().not_null())
                    .col(ColumnDef::new(TenantMigrations::Status).string().not_null())
                    .col(
                        ColumnDef::new(TenantMigrations::ExecutedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TenantMigrations::ErrorMessage).text())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tenant_migrations_tenant_name")
                    .table(TenantMigrations::Table)
                    .col(TenantMigrations::TenantId)
                    .col(TenantMigrations::MigrationName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RlsViolations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RlsViolations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(RlsViolations::TenantId).uuid())
                    .col(ColumnDef::new(RlsViolations::UserId).uuid())
                    .col(ColumnDef::new(RlsViolations::TableName).string().not_null())
                    .col(ColumnDef::new(RlsViolations::Operation).string().not_null())
                    .col(ColumnDef::new(RlsViolations::ViolationType).string().not_null())
                    .col(ColumnDef::new(RlsViolations::OriginalStatement).text())
                    .col(
                        ColumnDef::new(RlsViolations::AttemptedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RlsViolations::IpAddress).string())
                    .col(ColumnDef::new(RlsViolations::UserAgent).text())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_rls_violations_attempted_at")
                    .table(RlsViolations::Table)
                    .col(RlsViolations::AttemptedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RlsViolations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TenantMigrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TenantMigrations {
    Table,
    Id,
    TenantId,
    MigrationName,
    Direction,
    Status,
    ExecutedAt,
    ErrorMessage,
}

#[derive(DeriveIden)]
enum RlsViolations {
    Table,
    Id,
    TenantId,
    UserId,
    TableName,
    Operation,
    ViolationType,
    OriginalStatement,
    AttemptedAt,
    IpAddress,
    UserAgent,
}
