//! Notification routing: fans a message out to every configured channel.
//! Best-effort: a failing channel is logged and skipped, never propagated.

use std::sync::Mutex;

use autoreg_core::traits::Notifier;
use autoreg_core::types::{Notification, NotifyPriority};

/// Max notifications kept in the in-memory history.
const HISTORY_LIMIT: usize = 100;

/// Notification router. Owns the channels and a short history.
pub struct NotifyRouter {
    channels: Vec<Box<dyn Notifier>>,
    history: Mutex<Vec<Notification>>,
}

impl NotifyRouter {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Register a channel.
    pub fn register(&mut self, channel: Box<dyn Notifier>) {
        tracing::info!("📡 Notification channel registered: {}", channel.name());
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send to every channel that accepts the priority.
    /// Returns (channel name, delivered) for each channel tried.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<(String, bool)> {
        self.record(notification.clone());

        let mut results = Vec::new();
        for channel in &self.channels {
            if !channel.accepts(notification.priority) {
                continue;
            }
            let delivered = match channel.send(notification).await {
                Ok(()) => {
                    tracing::info!("✅ {} notification sent: {}", channel.name(), notification.title);
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        "⚠️ {} notification failed for '{}': {e}",
                        channel.name(),
                        notification.title
                    );
                    false
                }
            };
            results.push((channel.name().to_string(), delivered));
        }

        if results.is_empty() {
            tracing::debug!("📭 No channel accepted notification: {}", notification.title);
        }
        results
    }

    /// Convenience: build and dispatch.
    pub async fn notify(&self, title: &str, body: &str, source: &str, priority: NotifyPriority) {
        let notification = Notification::new(title, body, source, priority);
        self.dispatch(&notification).await;
    }

    /// Snapshot of recent notifications.
    pub fn history(&self) -> Vec<Notification> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    fn record(&self, notification: Notification) {
        if let Ok(mut history) = self.history.lock() {
            history.push(notification);
            if history.len() > HISTORY_LIMIT {
                history.remove(0);
            }
        }
    }
}

impl Default for NotifyRouter {
    fn default() -> Self {
        Self::new()
    }
}
