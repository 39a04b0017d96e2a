//! Telegram Bot API implementation of the [`UpdateSource`] trait, built on
//! `getUpdates` long polling.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{IngestError, UpdateSource};
use crate::{config::TelegramConfig, models::ChatMessage};

/// Pulls chat messages from the Telegram `getUpdates` endpoint.
pub struct TelegramUpdateSource {
    client: reqwest::Client,
    endpoint: String,
    long_poll_timeout: Duration,
    /// The next update id to request; advances past every seen update.
    offset: i64,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    description: Option<String>,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    title: Option<String>,
    username: Option<String>,
    first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
}

impl TelegramUpdateSource {
    /// Creates an update source for the configured bot.
    ///
    /// The HTTP timeout leaves headroom above the long-poll timeout so a
    /// quiet chat does not read as a request failure.
    pub fn new(config: &TelegramConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.long_poll_timeout_secs + Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: format!("{}/bot{}/getUpdates", config.api_base, config.bot_token),
            long_poll_timeout: config.long_poll_timeout_secs,
            offset: 0,
        }
    }

    fn to_chat_message(update: Update) -> Option<ChatMessage> {
        let message = update.message?;
        let from = message.from?;
        let text = message.text?;
        let is_group = matches!(message.chat.kind.as_str(), "group" | "supergroup");
        Some(ChatMessage {
            chat_id: message.chat.id,
            chat_title: message.chat.title.or(message.chat.username).or(message.chat.first_name),
            sender_id: from.id,
            sender_username: from.username,
            text,
            is_group,
        })
    }
}

#[async_trait]
impl UpdateSource for TelegramUpdateSource {
    async fn next_batch(&mut self) -> Result<Vec<ChatMessage>, IngestError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("offset", self.offset.to_string()),
                ("timeout", self.long_poll_timeout.as_secs().to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await?
            .json::<UpdatesResponse>()
            .await?;

        if !response.ok {
            return Err(IngestError::ApiError(
                response.description.unwrap_or_else(|| "getUpdates rejected".to_string()),
            ));
        }

        let mut messages = Vec::new();
        for update in response.result {
            self.offset = self.offset.max(update.update_id + 1);
            if let Some(message) = Self::to_chat_message(update) {
                messages.push(message);
            }
        }
        if !messages.is_empty() {
            tracing::debug!(count = messages.len(), "Chat messages received.");
        }
        Ok(messages)
    }
}
