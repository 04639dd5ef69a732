use async_trait::async_trait;

use crate::models::{Token, User};

/// Delivers account notifications to users
///
/// The server only needs to hand off the welcome message carrying the
/// activation token; transport is up to the implementation.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, user: &User, activation: &Token) -> anyhow::Result<()>;
}

/// Mailer that writes notifications to the log instead of sending them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_welcome(&self, user: &User, activation: &Token) -> anyhow::Result<()> {
        tracing::info!(
            user_id = user.id,
            recipient = %user.email,
            expiry = %activation.expiry,
            "Welcome message queued"
        );
        tracing::debug!(
            user_id = user.id,
            activation_token = %activation.plaintext,
            "Activation token issued"
        );
        Ok(())
    }
}
