//! Infrastructure layer: database connection, entities, and migrations

pub mod database;

pub use database::{init_database, DatabaseConfig};
