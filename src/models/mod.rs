//! Data models shared across the Warden services.

pub mod chat;
pub mod staff;
pub mod ticket;

pub use chat::ChatMessage;
pub use staff::{Staff, StaffRole, SupportActivity};
pub use ticket::Ticket;
