//! # Notification Service
//!
//! This module is responsible for delivering broadcast messages to a chat
//! audience: SLA warnings and breach notices from ticket monitors, command
//! replies from the intake layer, and the weekly report.
//!
//! Delivery is fire-and-forget at every call site: a failed broadcast is
//! logged and swallowed, because the correctness of the deadline clock must
//! never depend on notification delivery succeeding.

use async_trait::async_trait;

pub mod error;
mod telegram;

pub use error::NotificationError;
pub use telegram::TelegramNotifier;

/// A sink that can deliver a text message to a chat audience.
///
/// Implementations must be safe for concurrent sends from multiple ticket
/// monitors.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `text` to the chat identified by `audience`.
    async fn broadcast(&self, audience: i64, text: &str) -> Result<(), NotificationError>;
}
