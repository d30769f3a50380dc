//! SMS via a carrier email gateway (e.g. `5551234567@vtext.com`), sent over
//! SMTP with STARTTLS.

use async_trait::async_trait;
use autoreg_core::config::SmsGatewayConfig;
use autoreg_core::error::{AutoRegError, Result};
use autoreg_core::traits::Notifier;
use autoreg_core::types::{Notification, NotifyPriority};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Gateways commonly cut or split anything longer.
pub const SMS_SOFT_LIMIT: usize = 160;

pub struct SmsGatewayNotifier {
    config: SmsGatewayConfig,
}

impl SmsGatewayNotifier {
    pub fn new(config: SmsGatewayConfig) -> Self {
        Self { config }
    }

    /// Build the plain-text message for a notification.
    pub fn build_message(&self, notification: &Notification) -> Result<Message> {
        let from: Mailbox = self
            .config
            .sender
            .parse()
            .map_err(|e| AutoRegError::Notification(format!("Invalid sender: {e}")))?;
        let to: Mailbox = self
            .config
            .recipient
            .parse()
            .map_err(|e| AutoRegError::Notification(format!("Invalid recipient: {e}")))?;

        if notification.body.chars().count() > SMS_SOFT_LIMIT {
            tracing::warn!(
                "⚠️ SMS body is {} chars (> {SMS_SOFT_LIMIT}); the gateway may truncate it",
                notification.body.chars().count()
            );
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(notification.title.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| AutoRegError::Notification(format!("Build email: {e}")))
    }
}

#[async_trait]
impl Notifier for SmsGatewayNotifier {
    fn name(&self) -> &str {
        "sms"
    }

    /// Digests and other low-priority chatter stay off the phone.
    fn accepts(&self, priority: NotifyPriority) -> bool {
        priority >= NotifyPriority::Normal
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let email = self.build_message(notification)?;
        let creds = Credentials::new(self.config.sender.clone(), self.config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| AutoRegError::Notification(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| AutoRegError::Notification(format!("SMTP send: {e}")))?;

        tracing::info!("📤 SMS sent to {}", self.config.recipient);
        Ok(())
    }
}
