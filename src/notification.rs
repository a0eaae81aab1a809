// Run reports go to a Discord webhook when one is configured, to the log otherwise.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::NotificationSettings;
use crate::error::{AppError, AppResult};

/// Discord rejects longer message contents
const DISCORD_MESSAGE_LIMIT: usize = 2000;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a message. Delivery problems are logged, never raised.
    async fn send(&self, message: &str);
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Discord webhook client
pub struct DiscordWebhook {
    url: String,
    client: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, content: &str) -> AppResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { content })
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalError(format!(
                "Discord webhook error: {}",
                error_text
            )));
        }
        Ok(())
    }
}

/// Split on line boundaries so each part fits in one message
pub fn split_message(message: &str, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for line in message.split_inclusive('\n') {
        let mut line = line;
        while line.chars().count() > limit {
            let cut = line
                .char_indices()
                .nth(limit)
                .map(|(index, _)| index)
                .unwrap_or(line.len());
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            parts.push(line[..cut].to_string());
            line = &line[cut..];
        }
        if current.chars().count() + line.chars().count() > limit {
            parts.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[async_trait]
impl NotificationSink for DiscordWebhook {
    async fn send(&self, message: &str) {
        for part in split_message(message, DISCORD_MESSAGE_LIMIT) {
            match self.post(&part).await {
                Ok(()) => info!("📣 Notification has been sent using discord webhook"),
                Err(e) => {
                    warn!("⚠️  An error occurred while sending message to discord webhook: {}", e);
                    return;
                }
            }
        }
    }
}

/// Fallback when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, message: &str) {
        debug!("Notification (no webhook configured): {}", message);
    }
}

pub fn from_settings(settings: &NotificationSettings) -> Arc<dyn NotificationSink> {
    match settings.discord_webhook_url.as_deref() {
        Some(url) if !url.is_empty() => {
            debug!("Discord webhook url is set, notifications go to discord");
            Arc::new(DiscordWebhook::new(url.to_string()))
        }
        _ => {
            info!("Key discord_webhook_url isn't set in config");
            Arc::new(LogNotifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_is_not_split() {
        assert_eq!(split_message("# hello\nworld", 100), vec!["# hello\nworld"]);
    }

    #[test]
    fn test_long_message_is_split_on_lines() {
        let message = format!("{}\n{}\n", "a".repeat(8), "b".repeat(8));
        let parts = split_message(&message, 10);
        assert_eq!(parts, vec![format!("{}\n", "a".repeat(8)), format!("{}\n", "b".repeat(8))]);
    }

    #[test]
    fn test_oversized_line_is_cut() {
        let parts = split_message(&"x".repeat(25), 10);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|part| part.chars().count() <= 10));
    }
}
