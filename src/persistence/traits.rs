//! Store interfaces consumed by the SLA core, the intake layer and the
//! weekly report.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use super::error::PersistenceError;
use crate::models::{Staff, StaffRole, SupportActivity, Ticket};

/// Ticket access paths used by monitors, intake and reporting.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Returns the open ticket for a chat, if any.
    async fn get_open_ticket(&self, chat_id: i64) -> Result<Option<Ticket>, PersistenceError>;

    /// Returns the open ticket with the given chat title, if any.
    async fn get_open_ticket_by_title(
        &self,
        title: &str,
    ) -> Result<Option<Ticket>, PersistenceError>;

    /// Returns a ticket by its id.
    async fn get_ticket(&self, ticket_id: i64) -> Result<Option<Ticket>, PersistenceError>;

    /// Opens a ticket for a chat. Fails with `AlreadyExists` when the chat
    /// already has an open ticket.
    async fn create_ticket(&self, chat_id: i64, title: &str) -> Result<Ticket, PersistenceError>;

    /// Closes a ticket. `closed_by` is `None` for system auto-closure.
    async fn close_ticket(
        &self,
        ticket_id: i64,
        closed_by: Option<i64>,
    ) -> Result<(), PersistenceError>;

    /// Flags a ticket as having breached its SLA.
    async fn mark_overdue(&self, ticket_id: i64) -> Result<(), PersistenceError>;

    /// All currently open tickets, oldest first.
    async fn get_open_tickets(&self) -> Result<Vec<Ticket>, PersistenceError>;

    /// Overdue tickets created at or after the given instant.
    async fn overdue_tickets_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, PersistenceError>;
}

/// Staff directory and response-activity tracking.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StaffRepository: Send + Sync {
    /// The role of a user, if they are registered staff.
    async fn role_of(&self, user_id: i64) -> Result<Option<StaffRole>, PersistenceError>;

    /// Registers a staff member or updates their username and role.
    async fn upsert_staff<'a>(
        &self,
        user_id: i64,
        username: Option<&'a str>,
        role: StaffRole,
    ) -> Result<(), PersistenceError>;

    /// Removes a staff member.
    async fn remove_staff(&self, user_id: i64) -> Result<(), PersistenceError>;

    /// Looks up a staff member's user id by username.
    async fn find_user_id_by_username(
        &self,
        username: &str,
    ) -> Result<Option<i64>, PersistenceError>;

    /// All registered staff members.
    async fn all_staff(&self) -> Result<Vec<Staff>, PersistenceError>;

    /// Records one ticket-closing reply for a staff member.
    async fn increment_activity<'a>(
        &self,
        user_id: i64,
        username: Option<&'a str>,
    ) -> Result<(), PersistenceError>;

    /// Response counters of support staff updated at or after the given
    /// instant, busiest first.
    async fn support_activity_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SupportActivity>, PersistenceError>;
}
