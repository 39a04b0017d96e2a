//! Message intake: decides when tickets open and close from human activity.
//!
//! A customer message in a group chat opens a ticket (if none is open) and
//! starts its monitor. A reply from support or admin staff closes the open
//! ticket and credits the responder. Sales messages are ignored. Commands
//! cover ticket closure by chat title and staff role management.

use std::sync::Arc;

use crate::{
    models::{ChatMessage, StaffRole},
    notification::Notifier,
    persistence::{
        error::PersistenceError,
        traits::{StaffRepository, TicketRepository},
    },
    supervisor::MonitorSupervisor,
};

/// How a role-management command changes the staff table.
enum RoleChange {
    Add(StaffRole),
    Remove,
}

/// Splits a command message into its name and argument string.
///
/// Commands may be addressed as `/close@BotName` in group chats.
fn parse_command(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim().strip_prefix('/')?;
    let (command, args) = match rest.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (rest, ""),
    };
    let command = command.split('@').next().unwrap_or(command);
    if command.is_empty() {
        return None;
    }
    Some((command, args))
}

/// Routes incoming chat messages to ticket lifecycle actions.
pub struct IntakeService {
    tickets: Arc<dyn TicketRepository>,
    staff: Arc<dyn StaffRepository>,
    notifier: Arc<dyn Notifier>,
    supervisor: Arc<MonitorSupervisor>,
    /// The notification group chat; chatter there never opens tickets.
    audience: i64,
}

impl IntakeService {
    /// Creates the intake service.
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        staff: Arc<dyn StaffRepository>,
        notifier: Arc<dyn Notifier>,
        supervisor: Arc<MonitorSupervisor>,
        audience: i64,
    ) -> Self {
        Self { tickets, staff, notifier, supervisor, audience }
    }

    /// Processes one incoming chat message.
    pub async fn handle_message(&self, message: &ChatMessage) -> Result<(), PersistenceError> {
        if message.is_command() {
            return self.handle_command(message).await;
        }
        // Plain chatter in the notification group is not customer traffic.
        if message.chat_id == self.audience || !message.is_group {
            return Ok(());
        }

        let role = self.staff.role_of(message.sender_id).await?;
        match role {
            Some(role) if role.can_close_tickets() => {
                if let Some(ticket) = self.tickets.get_open_ticket(message.chat_id).await? {
                    self.staff
                        .increment_activity(message.sender_id, message.sender_username.as_deref())
                        .await?;
                    self.tickets.close_ticket(ticket.id, Some(message.sender_id)).await?;
                    tracing::info!(
                        ticket_id = ticket.id,
                        chat_id = message.chat_id,
                        user_id = message.sender_id,
                        "Ticket closed by staff reply."
                    );
                }
            }
            // Sales messages never open or close tickets.
            Some(_) => {}
            None => self.open_ticket_for_customer(message).await?,
        }
        Ok(())
    }

    /// Opens a ticket for a customer message unless one is already open.
    async fn open_ticket_for_customer(
        &self,
        message: &ChatMessage,
    ) -> Result<(), PersistenceError> {
        if self.tickets.get_open_ticket(message.chat_id).await?.is_some() {
            return Ok(());
        }
        match self.tickets.create_ticket(message.chat_id, &message.title()).await {
            Ok(ticket) => {
                tracing::info!(
                    ticket_id = ticket.id,
                    chat_id = message.chat_id,
                    "Ticket opened for customer message."
                );
                self.supervisor.on_ticket_opened(ticket.id, ticket.chat_id);
                Ok(())
            }
            // A concurrent message won the race; its monitor is already up.
            Err(PersistenceError::AlreadyExists(_)) => {
                tracing::debug!(chat_id = message.chat_id, "Ticket already opened concurrently.");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Dispatches a bot command.
    async fn handle_command(&self, message: &ChatMessage) -> Result<(), PersistenceError> {
        let Some((command, args)) = parse_command(&message.text) else {
            return Ok(());
        };
        match command {
            "start" => self.handle_start(message).await,
            "close" => self.handle_close(message, args).await,
            "check_roles" => self.handle_check_roles(message).await,
            "add_staff" => self.manage_role(message, args, RoleChange::Add(StaffRole::Support)).await,
            "add_admin" => self.manage_role(message, args, RoleChange::Add(StaffRole::Admin)).await,
            "add_sales" => self.manage_role(message, args, RoleChange::Add(StaffRole::Sales)).await,
            "remove_staff" | "remove_admin" | "remove_sales" => {
                self.manage_role(message, args, RoleChange::Remove).await
            }
            _ => Ok(()),
        }
    }

    /// Greets the sender according to their registered role.
    async fn handle_start(&self, message: &ChatMessage) -> Result<(), PersistenceError> {
        let role = self.staff.role_of(message.sender_id).await?;
        let reply = match role {
            Some(StaffRole::Support) => "Hello! You are registered as a support engineer.",
            Some(StaffRole::Admin) => "Hello! You are registered as an administrator.",
            Some(StaffRole::Sales) => "Hello! You are registered as a sales member.",
            None => "Hello! You are not registered in the system.",
        };
        self.reply(message, reply).await;
        Ok(())
    }

    /// Closes the open ticket with the given chat title.
    async fn handle_close(&self, message: &ChatMessage, args: &str) -> Result<(), PersistenceError> {
        let role = self.staff.role_of(message.sender_id).await?;
        if !role.is_some_and(|role| role.can_close_tickets()) {
            self.reply(message, "You are not allowed to run this command.").await;
            return Ok(());
        }

        let title = args.trim_matches('"');
        if title.is_empty() {
            self.reply(message, "Provide the chat title of the ticket to close.").await;
            return Ok(());
        }

        match self.tickets.get_open_ticket_by_title(title).await? {
            Some(ticket) => {
                self.tickets.close_ticket(ticket.id, Some(message.sender_id)).await?;
                self.broadcast(&format!("✅ Ticket for chat \"{title}\" has been closed.")).await;
            }
            None => {
                tracing::warn!(
                    user_id = message.sender_id,
                    title,
                    "Attempt to close a missing or already closed ticket."
                );
                self.reply(message, &format!("⚠️ No open ticket found for chat \"{title}\"."))
                    .await;
            }
        }
        Ok(())
    }

    /// Tells the sender their registered role.
    async fn handle_check_roles(&self, message: &ChatMessage) -> Result<(), PersistenceError> {
        let reply = match self.staff.role_of(message.sender_id).await? {
            Some(role) => format!("Your role: {role}"),
            None => "You are not registered in the system.".to_string(),
        };
        self.reply(message, &reply).await;
        Ok(())
    }

    /// Adds or removes a staff member. Admin only; the target is given as a
    /// numeric user id or an @username.
    async fn manage_role(
        &self,
        message: &ChatMessage,
        args: &str,
        change: RoleChange,
    ) -> Result<(), PersistenceError> {
        let issuer = self.staff.role_of(message.sender_id).await?;
        if issuer != Some(StaffRole::Admin) {
            self.reply(message, "You are not allowed to run this command.").await;
            return Ok(());
        }
        if args.is_empty() {
            self.reply(message, "Provide a user id or @username.").await;
            return Ok(());
        }

        let (target_id, target_username) = if let Ok(user_id) = args.parse::<i64>() {
            (Some(user_id), None)
        } else {
            let username = args.trim_start_matches('@');
            (self.staff.find_user_id_by_username(username).await?, Some(username.to_string()))
        };
        let Some(target_id) = target_id else {
            self.reply(message, "User not found.").await;
            return Ok(());
        };

        match change {
            RoleChange::Add(role) => {
                self.staff.upsert_staff(target_id, target_username.as_deref(), role).await?;
                self.reply(message, &format!("User {target_id} registered with role {role}."))
                    .await;
            }
            RoleChange::Remove => {
                self.staff.remove_staff(target_id).await?;
                self.reply(message, &format!("User {target_id} removed from staff.")).await;
            }
        }
        Ok(())
    }

    /// Replies in the chat the message came from, logging delivery failures.
    async fn reply(&self, message: &ChatMessage, text: &str) {
        if let Err(error) = self.notifier.broadcast(message.chat_id, text).await {
            tracing::error!(
                chat_id = message.chat_id,
                error = %error,
                "Failed to deliver reply."
            );
        }
    }

    /// Broadcasts to the notification group, logging delivery failures.
    async fn broadcast(&self, text: &str) {
        if let Err(error) = self.notifier.broadcast(self.audience, text).await {
            tracing::error!(error = %error, "Failed to deliver broadcast.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_command() {
        assert_eq!(parse_command("/start"), Some(("start", "")));
        assert_eq!(parse_command("/close \"Acme support\""), Some(("close", "\"Acme support\"")));
    }

    #[test]
    fn test_parse_command_with_bot_suffix() {
        assert_eq!(parse_command("/close@WardenBot \"Acme\""), Some(("close", "\"Acme\"")));
    }

    #[test]
    fn test_parse_command_trims_argument_whitespace() {
        assert_eq!(parse_command("/add_staff   42  "), Some(("add_staff", "42")));
    }

    #[test]
    fn test_non_commands_do_not_parse() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
    }
}
