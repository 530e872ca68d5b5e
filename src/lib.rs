//! # MediFlow Service
//!
//! Hospital/pharmacy administration backend: JWT authentication with
//! role-based access (admin, doctor, pharmacist), patient records with
//! RFID card lookup, prescription workflow, and medicine dispenser
//! fleet monitoring.
//!
//! ## Architecture
//!
//! - **auth**: JWT authentication, password hashing, dispenser device keys
//! - **application**: Background services (dispenser monitor, mail delivery seam)
//! - **infrastructure**: Database entities, migrations, connection setup
//! - **api**: REST API with Swagger documentation
//! - **support**: Graceful shutdown plumbing

pub mod api;
pub mod application;
pub mod auth;
pub mod config;
pub mod infrastructure;
pub mod support;

pub use config::{default_config_path, AppConfig};

// Re-export database types for easy access
pub use infrastructure::{init_database, DatabaseConfig};

// Re-export API router
pub use api::create_api_router;
