//! Discord webhook channel: one embed per notification, colored by priority.

use std::time::Duration;

use async_trait::async_trait;
use autoreg_core::config::DiscordWebhookConfig;
use autoreg_core::error::{AutoRegError, Result};
use autoreg_core::traits::Notifier;
use autoreg_core::types::{Notification, NotifyPriority};
use serde_json::{Value, json};

/// Discord caps embed descriptions at 4096; leave room for the ellipsis.
const DESCRIPTION_LIMIT: usize = 4000;
const TITLE_LIMIT: usize = 256;

pub struct DiscordNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordWebhookConfig) -> Self {
        Self {
            webhook_url: config.webhook_url.clone(),
            client: reqwest::Client::new(),
        }
    }
}

/// Embed color per priority. Low is the schedule digest's teal.
pub fn priority_color(priority: NotifyPriority) -> u32 {
    match priority {
        NotifyPriority::Urgent => 0xFF0000,
        NotifyPriority::High => 0xFF8800,
        NotifyPriority::Normal => 0x00AAFF,
        NotifyPriority::Low => 0x1ABC9C,
    }
}

/// Webhook JSON for one notification.
pub fn embed_payload(notification: &Notification) -> Value {
    json!({
        "embeds": [{
            "title": truncate(&notification.title, TITLE_LIMIT),
            "description": truncate(&notification.body, DESCRIPTION_LIMIT),
            "color": priority_color(notification.priority),
            "footer": {
                "text": format!("Source: {} • {}", notification.source, notification.timestamp.format("%H:%M:%S UTC"))
            },
            "timestamp": notification.timestamp.to_rfc3339(),
        }]
    })
}

/// Cut to at most `limit` chars, marking the cut with `...`.
fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&embed_payload(notification))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| AutoRegError::Notification(format!("Discord send failed: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(AutoRegError::Notification(format!(
                "Discord webhook error {status}: {body}"
            )))
        }
    }
}
