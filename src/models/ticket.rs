//! This module defines the `Ticket` structure, a support request opened
//! implicitly by a customer message in a monitored chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A support ticket tracked against the SLA deadline clock.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    /// Unique identifier for the ticket, assigned by the store.
    #[sqlx(rename = "ticket_id")]
    pub id: i64,

    /// The chat the ticket belongs to. At most one open ticket exists per
    /// chat at any time.
    pub chat_id: i64,

    /// Human-readable chat title, used in notifications and by the `/close`
    /// command.
    pub title: String,

    /// Instant the ticket was opened (UTC). The SLA clock starts here.
    pub created_at: DateTime<Utc>,

    /// Whether the ticket breached its SLA. Implies `is_closed` at rest.
    pub is_overdue: bool,

    /// Whether the ticket is closed, by a staff reply, the `/close` command
    /// or overdue auto-closure.
    pub is_closed: bool,

    /// Instant the ticket was closed, if it is.
    pub closed_at: Option<DateTime<Utc>>,

    /// The staff member who closed the ticket; `None` for system
    /// auto-closure.
    pub closed_by: Option<i64>,
}

impl Ticket {
    /// A ticket is open while it has not been closed by any path.
    pub fn is_open(&self) -> bool {
        !self.is_closed
    }
}
