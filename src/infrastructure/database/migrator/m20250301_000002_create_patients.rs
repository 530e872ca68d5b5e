//! Create patients table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Patients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Patients::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Patients::FirstName).string_len(100).not_null())
                    .col(ColumnDef::new(Patients::LastName).string_len(100).not_null())
                    .col(ColumnDef::new(Patients::DateOfBirth).date().not_null())
                    .col(ColumnDef::new(Patients::Nic).string_len(20))
                    .col(ColumnDef::new(Patients::Gender).string_len(10).not_null())
                    .col(ColumnDef::new(Patients::Email).string_len(255))
                    .col(ColumnDef::new(Patients::Phone).string_len(20).not_null())
                    .col(ColumnDef::new(Patients::Address).string().not_null())
                    .col(ColumnDef::new(Patients::City).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Patients::EmergencyContactName)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Patients::EmergencyContactPhone)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Patients::BloodType).string_len(5))
                    .col(ColumnDef::new(Patients::Allergies).text())
                    .col(ColumnDef::new(Patients::MedicalConditions).text())
                    .col(
                        ColumnDef::new(Patients::RfidCardUid)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Patients::CardIssueDate).date().not_null())
                    .col(
                        ColumnDef::new(Patients::CardStatus)
                            .string_len(10)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Patients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Patients::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Card scans are the hot lookup path
        manager
            .create_index(
                Index::create()
                    .name("idx_patients_rfid_card_uid")
                    .table(Patients::Table)
                    .col(Patients::RfidCardUid)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_patients_card_status")
                    .table(Patients::Table)
                    .col(Patients::CardStatus)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Patients::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Patients {
    Table,
    Id,
    FirstName,
    LastName,
    DateOfBirth,
    Nic,
    Gender,
    Email,
    Phone,
    Address,
    City,
    EmergencyContactName,
    EmergencyContactPhone,
    BloodType,
    Allergies,
    MedicalConditions,
    RfidCardUid,
    CardIssueDate,
    CardStatus,
    CreatedAt,
    UpdatedAt,
}
