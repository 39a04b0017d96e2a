//! Staff membership, roles and response-activity models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role of a registered staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum StaffRole {
    /// Support engineers; their replies close tickets.
    Support,
    /// Administrators; full support rights plus role management.
    Admin,
    /// Sales staff; their messages never open or close tickets.
    Sales,
}

impl StaffRole {
    /// Roles whose chat replies and `/close` commands close tickets.
    pub fn can_close_tickets(self) -> bool {
        matches!(self, StaffRole::Support | StaffRole::Admin)
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StaffRole::Support => "support",
            StaffRole::Admin => "admin",
            StaffRole::Sales => "sales",
        };
        f.write_str(name)
    }
}

/// A registered staff member.
#[derive(Debug, Clone, FromRow)]
pub struct Staff {
    /// Messenger user id.
    pub user_id: i64,
    /// Messenger username, if known.
    pub username: Option<String>,
    /// Assigned role.
    pub role: StaffRole,
}

/// Weekly response counter for a support staff member.
#[derive(Debug, Clone, FromRow)]
pub struct SupportActivity {
    /// Messenger user id.
    pub user_id: i64,
    /// Messenger username, if known.
    pub username: Option<String>,
    /// Number of ticket-closing replies recorded.
    pub responses: i64,
    /// Instant of the most recent recorded reply.
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_closing_rights() {
        assert!(StaffRole::Support.can_close_tickets());
        assert!(StaffRole::Admin.can_close_tickets());
        assert!(!StaffRole::Sales.can_close_tickets());
    }

    #[test]
    fn test_role_display_matches_storage_form() {
        assert_eq!(StaffRole::Support.to_string(), "support");
        assert_eq!(StaffRole::Admin.to_string(), "admin");
        assert_eq!(StaffRole::Sales.to_string(), "sales");
    }
}
