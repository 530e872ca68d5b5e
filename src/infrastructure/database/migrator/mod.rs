//! Database migrations module

pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_users;
mod m20250301_000002_create_patients;
mod m20250301_000003_create_medicines;
mod m20250301_000004_create_prescriptions;
mod m20250301_000005_create_dispensers;
mod m20250301_000006_create_password_reset_tokens;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_users::Migration),
            Box::new(m20250301_000002_create_patients::Migration),
            Box::new(m20250301_000003_create_medicines::Migration),
            Box::new(m20250301_000004_create_prescriptions::Migration),
            Box::new(m20250301_000005_create_dispensers::Migration),
            Box::new(m20250301_000006_create_password_reset_tokens::Migration),
        ]
    }
}
