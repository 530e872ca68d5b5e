//! Application services

pub mod dispenser_monitor;
pub mod mailer;

pub use dispenser_monitor::{DispenserMonitor, FleetStats, MonitorSettings};
pub use mailer::{LogMailer, MailError, MailNotifier};
