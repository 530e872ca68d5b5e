//! Create dispensers table

use sea_orm_migration::prelude::*;

use super::m20250301_000003_create_medicines::Medicines;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Dispensers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Dispensers::Name)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Dispensers::MedicineId).string())
                    .col(
                        ColumnDef::new(Dispensers::Status)
                            .string_len(15)
                            .not_null()
                            .default("offline"),
                    )
                    .col(
                        ColumnDef::new(Dispensers::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Dispensers::DeviceKeyHash).string().not_null())
                    .col(ColumnDef::new(Dispensers::FirmwareVersion).string_len(50))
                    .col(ColumnDef::new(Dispensers::LastReportAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Dispensers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Dispensers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dispensers_medicine")
                            .from(Dispensers::Table, Dispensers::MedicineId)
                            .to(Medicines::Table, Medicines::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dispensers_status")
                    .table(Dispensers::Table)
                    .col(Dispensers::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Dispensers::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Dispensers {
    Table,
    Name,
    MedicineId,
    Status,
    IsActive,
    DeviceKeyHash,
    FirmwareVersion,
    LastReportAt,
    CreatedAt,
    UpdatedAt,
}
