//! Create medicines table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Medicines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Medicines::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Medicines::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Medicines::GenericName).string_len(200))
                    .col(ColumnDef::new(Medicines::Strength).string_len(50))
                    .col(ColumnDef::new(Medicines::Form).string_len(10).not_null())
                    .col(
                        ColumnDef::new(Medicines::StockQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Medicines::UnitPriceCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Medicines::ExpiryDate).date())
                    .col(ColumnDef::new(Medicines::BatchNumber).string_len(50))
                    .col(
                        ColumnDef::new(Medicines::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Medicines::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Medicines::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_medicines_name")
                    .table(Medicines::Table)
                    .col(Medicines::Name)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Medicines::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Medicines {
    Table,
    Id,
    Name,
    GenericName,
    Strength,
    Form,
    StockQuantity,
    UnitPriceCents,
    ExpiryDate,
    BatchNumber,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
