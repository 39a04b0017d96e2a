//! The chat-message boundary type produced by an update source.

/// A chat message crossing the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// The chat the message was posted in.
    pub chat_id: i64,
    /// Chat title, if the transport knows one.
    pub chat_title: Option<String>,
    /// The sender's user id.
    pub sender_id: i64,
    /// The sender's username, if known.
    pub sender_username: Option<String>,
    /// Message text.
    pub text: String,
    /// Whether the chat is a group chat (customer conversations are).
    pub is_group: bool,
}

impl ChatMessage {
    /// The title used when opening a ticket for this chat.
    pub fn title(&self) -> String {
        self.chat_title.clone().unwrap_or_else(|| format!("chat {}", self.chat_id))
    }

    /// Whether the message is a bot command.
    pub fn is_command(&self) -> bool {
        self.text.starts_with('/')
    }
}
