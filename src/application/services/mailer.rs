//! Mail delivery seam
//!
//! Temporary passwords and password-reset tokens leave the system through
//! this trait. The default implementation writes to the log; deployments
//! wire in a real transport behind the same interface.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification channel for credential material
#[async_trait]
pub trait MailNotifier: Send + Sync {
    /// Deliver a freshly generated temporary password to a new staff account
    async fn send_temporary_password(
        &self,
        email: &str,
        username: &str,
        temp_password: &str,
    ) -> Result<(), MailError>;

    /// Deliver a password-reset token
    async fn send_password_reset(&self, email: &str, reset_token: &str) -> Result<(), MailError>;
}

/// Log-backed notifier for development and tests
pub struct LogMailer;

#[async_trait]
impl MailNotifier for LogMailer {
    async fn send_temporary_password(
        &self,
        email: &str,
        username: &str,
        temp_password: &str,
    ) -> Result<(), MailError> {
        tracing::info!(
            email,
            username,
            "temporary password issued: {}",
            temp_password
        );
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, reset_token: &str) -> Result<(), MailError> {
        tracing::info!(email, "password reset token issued: {}", reset_token);
        Ok(())
    }
}
