//! Create prescriptions table

use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_users::Users;
use super::m20250301_000002_create_patients::Patients;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Prescriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Prescriptions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Prescriptions::PatientId).string().not_null())
                    .col(ColumnDef::new(Prescriptions::DoctorId).string().not_null())
                    .col(ColumnDef::new(Prescriptions::Diagnosis).text())
                    .col(ColumnDef::new(Prescriptions::Medicines).text().not_null())
                    .col(
                        ColumnDef::new(Prescriptions::Status)
                            .string_len(10)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Prescriptions::DispensedBy).string())
                    .col(ColumnDef::new(Prescriptions::DispensedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Prescriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Prescriptions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_prescriptions_patient")
                            .from(Prescriptions::Table, Prescriptions::PatientId)
                            .to(Patients::Table, Patients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_prescriptions_doctor")
                            .from(Prescriptions::Table, Prescriptions::DoctorId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Doctors list their own; pharmacists drain the pending queue
        manager
            .create_index(
                Index::create()
                    .name("idx_prescriptions_doctor_id")
                    .table(Prescriptions::Table)
                    .col(Prescriptions::DoctorId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_prescriptions_status")
                    .table(Prescriptions::Table)
                    .col(Prescriptions::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Prescriptions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Prescriptions {
    Table,
    Id,
    PatientId,
    DoctorId,
    Diagnosis,
    Medicines,
    Status,
    DispensedBy,
    DispensedAt,
    CreatedAt,
    UpdatedAt,
}
