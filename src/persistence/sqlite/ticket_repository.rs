//! Implementation of the TicketRepository trait for SqliteStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::Ticket,
    persistence::{error::PersistenceError, sqlite::SqliteStore, traits::TicketRepository},
};

const TICKET_COLUMNS: &str =
    "ticket_id, chat_id, title, created_at, is_overdue, is_closed, closed_at, closed_by";

#[async_trait]
impl TicketRepository for SqliteStore {
    /// Returns the open ticket for a chat, if any.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_open_ticket(&self, chat_id: i64) -> Result<Option<Ticket>, PersistenceError> {
        self.run_query(
            "query open ticket by chat",
            sqlx::query_as::<_, Ticket>(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE chat_id = ? AND is_closed = FALSE"
            ))
            .bind(chat_id)
            .fetch_optional(self.pool()),
        )
        .await
    }

    /// Returns the open ticket with the given chat title, if any.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_open_ticket_by_title(
        &self,
        title: &str,
    ) -> Result<Option<Ticket>, PersistenceError> {
        self.run_query(
            "query open ticket by title",
            sqlx::query_as::<_, Ticket>(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE title = ? AND is_closed = FALSE"
            ))
            .bind(title)
            .fetch_optional(self.pool()),
        )
        .await
    }

    /// Returns a ticket by its id.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_ticket(&self, ticket_id: i64) -> Result<Option<Ticket>, PersistenceError> {
        self.run_query(
            "query ticket by id",
            sqlx::query_as::<_, Ticket>(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_id = ?"
            ))
            .bind(ticket_id)
            .fetch_optional(self.pool()),
        )
        .await
    }

    /// Opens a ticket for a chat.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn create_ticket(&self, chat_id: i64, title: &str) -> Result<Ticket, PersistenceError> {
        let result = sqlx::query_as::<_, Ticket>(&format!(
            "INSERT INTO tickets (chat_id, title, created_at) VALUES (?, ?, ?) \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(chat_id)
        .bind(title)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await;

        match result {
            Ok(ticket) => {
                tracing::info!(ticket_id = ticket.id, chat_id, title, "Ticket created.");
                Ok(ticket)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(PersistenceError::AlreadyExists(format!("open ticket for chat {chat_id}")))
            }
            Err(e) => {
                tracing::error!(error = %e, chat_id, "Failed to create ticket.");
                Err(PersistenceError::OperationFailed(e.to_string()))
            }
        }
    }

    /// Closes a ticket, recording who closed it.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn close_ticket(
        &self,
        ticket_id: i64,
        closed_by: Option<i64>,
    ) -> Result<(), PersistenceError> {
        let result = self
            .run_query(
                "close ticket",
                sqlx::query(
                    "UPDATE tickets SET is_closed = TRUE, closed_at = ?, closed_by = ? \
                     WHERE ticket_id = ?",
                )
                .bind(Utc::now())
                .bind(closed_by)
                .bind(ticket_id)
                .execute(self.pool()),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("ticket {ticket_id}")));
        }
        tracing::info!(ticket_id, ?closed_by, "Ticket closed.");
        Ok(())
    }

    /// Flags a ticket as having breached its SLA.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn mark_overdue(&self, ticket_id: i64) -> Result<(), PersistenceError> {
        let result = self
            .run_query(
                "mark ticket overdue",
                sqlx::query("UPDATE tickets SET is_overdue = TRUE WHERE ticket_id = ?")
                    .bind(ticket_id)
                    .execute(self.pool()),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("ticket {ticket_id}")));
        }
        tracing::info!(ticket_id, "Ticket marked overdue.");
        Ok(())
    }

    /// All currently open tickets, oldest first.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_open_tickets(&self) -> Result<Vec<Ticket>, PersistenceError> {
        self.run_query(
            "query open tickets",
            sqlx::query_as::<_, Ticket>(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE is_closed = FALSE \
                 ORDER BY created_at"
            ))
            .fetch_all(self.pool()),
        )
        .await
    }

    /// Overdue tickets created at or after the given instant.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn overdue_tickets_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, PersistenceError> {
        self.run_query(
            "query overdue tickets",
            sqlx::query_as::<_, Ticket>(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets \
                 WHERE is_overdue = TRUE AND created_at >= ? ORDER BY closed_at"
            ))
            .bind(since)
            .fetch_all(self.pool()),
        )
        .await
    }
}
