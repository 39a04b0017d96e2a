//! Telegram Bot API implementation of the [`Notifier`] sink.

use async_trait::async_trait;
use serde::Deserialize;

use super::{error::NotificationError, Notifier};
use crate::config::TelegramConfig;

/// Delivers broadcasts through the Telegram `sendMessage` endpoint.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
}

/// The envelope every Bot API response is wrapped in.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    /// Creates a notifier for the configured bot.
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/bot{}/sendMessage", config.api_base, config.bot_token),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn broadcast(&self, audience: i64, text: &str) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "chat_id": audience, "text": text }))
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse = response.json().await?;
        if !status.is_success() || !body.ok {
            return Err(NotificationError::Rejected(
                body.description.unwrap_or_else(|| format!("HTTP status {status}")),
            ));
        }

        tracing::debug!(audience, "Broadcast delivered.");
        Ok(())
    }
}
