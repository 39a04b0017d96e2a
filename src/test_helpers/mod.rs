//! Shared builders and fakes for unit and integration tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};

use crate::{
    calendar::{WorkingCalendar, WorkingWindow},
    config::{AppConfig, SlaConfig, TelegramConfig},
    models::{ChatMessage, Ticket},
    notification::{NotificationError, Notifier},
};

/// A builder for `Ticket` test fixtures.
#[derive(Debug, Clone)]
pub struct TicketBuilder {
    ticket: Ticket,
}

impl TicketBuilder {
    /// Creates a builder for an open, freshly created ticket.
    pub fn new() -> Self {
        Self {
            ticket: Ticket {
                id: 1,
                chat_id: 1,
                title: "Test chat".to_string(),
                created_at: Utc::now(),
                is_overdue: false,
                is_closed: false,
                closed_at: None,
                closed_by: None,
            },
        }
    }

    /// Sets the ticket id.
    pub fn id(mut self, id: i64) -> Self {
        self.ticket.id = id;
        self
    }

    /// Sets the chat id.
    pub fn chat_id(mut self, chat_id: i64) -> Self {
        self.ticket.chat_id = chat_id;
        self
    }

    /// Sets the chat title.
    pub fn title(mut self, title: &str) -> Self {
        self.ticket.title = title.to_string();
        self
    }

    /// Sets the creation instant.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.ticket.created_at = created_at;
        self
    }

    /// Marks the ticket as closed.
    pub fn closed(mut self) -> Self {
        self.ticket.is_closed = true;
        self.ticket.closed_at = Some(Utc::now());
        self
    }

    /// Builds the ticket.
    pub fn build(self) -> Ticket {
        self.ticket
    }
}

impl Default for TicketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A builder for `ChatMessage` test fixtures.
#[derive(Debug, Clone)]
pub struct ChatMessageBuilder {
    message: ChatMessage,
}

impl ChatMessageBuilder {
    /// Creates a builder for a plain customer group message.
    pub fn new() -> Self {
        Self {
            message: ChatMessage {
                chat_id: 1,
                chat_title: None,
                sender_id: 1000,
                sender_username: None,
                text: "hello".to_string(),
                is_group: true,
            },
        }
    }

    /// Sets the chat id.
    pub fn chat_id(mut self, chat_id: i64) -> Self {
        self.message.chat_id = chat_id;
        self
    }

    /// Sets the chat title.
    pub fn chat_title(mut self, title: &str) -> Self {
        self.message.chat_title = Some(title.to_string());
        self
    }

    /// Sets the sender's user id.
    pub fn sender_id(mut self, sender_id: i64) -> Self {
        self.message.sender_id = sender_id;
        self
    }

    /// Sets the sender's username.
    pub fn sender_username(mut self, username: &str) -> Self {
        self.message.sender_username = Some(username.to_string());
        self
    }

    /// Sets the message text.
    pub fn text(mut self, text: &str) -> Self {
        self.message.text = text.to_string();
        self
    }

    /// Marks the message as coming from a private chat.
    pub fn private(mut self) -> Self {
        self.message.is_group = false;
        self
    }

    /// Builds the message.
    pub fn build(self) -> ChatMessage {
        self.message
    }
}

impl Default for ChatMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A `Notifier` that records every broadcast instead of delivering it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All broadcasts recorded so far, in delivery order.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    /// Recorded broadcasts whose text contains `needle`.
    pub fn sent_containing(&self, needle: &str) -> Vec<(i64, String)> {
        self.sent().into_iter().filter(|(_, text)| text.contains(needle)).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn broadcast(&self, audience: i64, text: &str) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push((audience, text.to_string()));
        Ok(())
    }
}

/// A `Notifier` that fails every broadcast, for delivery-failure paths.
#[derive(Debug, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn broadcast(&self, _audience: i64, _text: &str) -> Result<(), NotificationError> {
        Err(NotificationError::Rejected("synthetic delivery failure".to_string()))
    }
}

fn full_day_window() -> WorkingWindow {
    WorkingWindow {
        start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
    }
}

/// A calendar whose working window covers effectively the whole day, so
/// working minutes equal wall-clock minutes in tests.
pub fn always_working_calendar() -> WorkingCalendar {
    WorkingCalendar::new(chrono_tz::Europe::Moscow, full_day_window(), full_day_window())
        .unwrap()
}

/// A calendar whose working window is guaranteed to be hours away from the
/// current instant, so every test evaluation lands outside working hours.
pub fn off_hours_calendar() -> WorkingCalendar {
    let tz = chrono_tz::Europe::Moscow;
    let now = Utc::now().with_timezone(&tz).time();
    let window = if now < NaiveTime::from_hms_opt(12, 0, 0).unwrap() {
        WorkingWindow {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        }
    } else {
        WorkingWindow {
            start: NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        }
    };
    WorkingCalendar::new(tz, window, window).unwrap()
}

/// An `AppConfig` suitable for fast tests: always-working calendar windows
/// and a short poll interval.
pub fn test_app_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        sla: SlaConfig {
            sla_minutes: 60,
            thresholds: vec![15, 10, 5],
            weekday_window: full_day_window(),
            weekend_window: full_day_window(),
            calendar_timezone: chrono_tz::Europe::Moscow,
            poll_interval_secs: Duration::from_millis(50),
        },
        telegram: TelegramConfig {
            bot_token: "test-token".to_string(),
            notification_chat_id: -1,
            api_base: "http://localhost:1".to_string(),
            long_poll_timeout_secs: Duration::from_secs(1),
        },
        shutdown_timeout_secs: Duration::from_secs(5),
    }
}
