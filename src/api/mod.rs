//! REST API module for the MediFlow service
//!
//! Provides HTTP endpoints for authentication, patient records,
//! prescriptions, the medicine formulary, and dispenser fleet management.

pub mod dto;
pub mod extract;
pub mod handlers;
pub mod router;

pub use router::create_api_router;
