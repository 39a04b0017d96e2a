//! Implementation of the StaffRepository trait for SqliteStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::{Staff, StaffRole, SupportActivity},
    persistence::{error::PersistenceError, sqlite::SqliteStore, traits::StaffRepository},
};

#[async_trait]
impl StaffRepository for SqliteStore {
    /// The role of a user, if they are registered staff.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn role_of(&self, user_id: i64) -> Result<Option<StaffRole>, PersistenceError> {
        let staff = self
            .run_query(
                "query staff role",
                sqlx::query_as::<_, Staff>(
                    "SELECT user_id, username, role FROM staff WHERE user_id = ?",
                )
                .bind(user_id)
                .fetch_optional(self.pool()),
            )
            .await?;
        Ok(staff.map(|s| s.role))
    }

    /// Registers a staff member or updates their username and role.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn upsert_staff<'a>(
        &self,
        user_id: i64,
        username: Option<&'a str>,
        role: StaffRole,
    ) -> Result<(), PersistenceError> {
        self.run_query(
            "upsert staff",
            sqlx::query(
                "INSERT INTO staff (user_id, username, role) VALUES (?, ?, ?) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                 username = excluded.username, role = excluded.role",
            )
            .bind(user_id)
            .bind(username)
            .bind(role)
            .execute(self.pool()),
        )
        .await?;
        tracing::info!(user_id, %role, "Staff member registered or updated.");
        Ok(())
    }

    /// Removes a staff member.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn remove_staff(&self, user_id: i64) -> Result<(), PersistenceError> {
        self.run_query(
            "remove staff",
            sqlx::query("DELETE FROM staff WHERE user_id = ?")
                .bind(user_id)
                .execute(self.pool()),
        )
        .await?;
        tracing::info!(user_id, "Staff member removed.");
        Ok(())
    }

    /// Looks up a staff member's user id by username.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn find_user_id_by_username(
        &self,
        username: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        let row: Option<(i64,)> = self
            .run_query(
                "query staff by username",
                sqlx::query_as("SELECT user_id FROM staff WHERE username = ?")
                    .bind(username)
                    .fetch_optional(self.pool()),
            )
            .await?;
        Ok(row.map(|(user_id,)| user_id))
    }

    /// All registered staff members.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn all_staff(&self) -> Result<Vec<Staff>, PersistenceError> {
        self.run_query(
            "query all staff",
            sqlx::query_as::<_, Staff>("SELECT user_id, username, role FROM staff")
                .fetch_all(self.pool()),
        )
        .await
    }

    /// Records one ticket-closing reply for a staff member.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn increment_activity<'a>(
        &self,
        user_id: i64,
        username: Option<&'a str>,
    ) -> Result<(), PersistenceError> {
        self.run_query(
            "increment support activity",
            sqlx::query(
                "INSERT INTO support_activity (user_id, username, responses, last_updated) \
                 VALUES (?, ?, 1, ?) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                 responses = support_activity.responses + 1, \
                 username = excluded.username, \
                 last_updated = excluded.last_updated",
            )
            .bind(user_id)
            .bind(username)
            .bind(Utc::now())
            .execute(self.pool()),
        )
        .await?;
        tracing::debug!(user_id, "Support activity recorded.");
        Ok(())
    }

    /// Response counters of support staff updated at or after the given
    /// instant, busiest first.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn support_activity_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SupportActivity>, PersistenceError> {
        self.run_query(
            "query support activity",
            sqlx::query_as::<_, SupportActivity>(
                "SELECT sa.user_id, sa.username, sa.responses, sa.last_updated \
                 FROM support_activity sa \
                 JOIN staff s ON sa.user_id = s.user_id \
                 WHERE s.role = 'support' AND sa.last_updated >= ? \
                 ORDER BY sa.responses DESC",
            )
            .bind(since)
            .fetch_all(self.pool()),
        )
        .await
    }
}
