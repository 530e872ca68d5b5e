//! Application layer: background services and delivery seams

pub mod services;

pub use services::{DispenserMonitor, FleetStats, LogMailer, MailNotifier};
