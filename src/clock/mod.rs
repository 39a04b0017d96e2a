//! The deadline clock: maps a ticket's creation instant to remaining SLA
//! minutes under the working calendar.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};

use crate::calendar::WorkingCalendar;

/// Evaluates how much of a ticket's SLA budget remains at a given instant.
#[derive(Debug, Clone)]
pub struct DeadlineClock {
    calendar: Arc<WorkingCalendar>,
    sla_minutes: i64,
    /// Announcement thresholds, kept sorted ascending so the most urgent
    /// unannounced threshold is found first.
    thresholds: Vec<i64>,
}

impl DeadlineClock {
    /// Creates a clock with the given SLA budget and announcement thresholds
    /// (accepted in any order; duplicates are dropped).
    pub fn new(calendar: Arc<WorkingCalendar>, sla_minutes: i64, thresholds: &[i64]) -> Self {
        let mut thresholds = thresholds.to_vec();
        thresholds.sort_unstable();
        thresholds.dedup();
        Self { calendar, sla_minutes, thresholds }
    }

    /// Working minutes left until the SLA breaches; negative once overdue.
    pub fn remaining_minutes(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let elapsed = self.calendar.working_minutes_between(created_at, now);
        self.sla_minutes - elapsed.floor() as i64
    }

    /// Whether the remaining budget is exhausted.
    pub fn is_breached(remaining: i64) -> bool {
        remaining <= 0
    }

    /// Returns the most urgent threshold that `remaining` has reached and
    /// that has not been announced yet.
    ///
    /// A threshold fires on `remaining <= m`, not exact equality, so a poll
    /// cadence that skips an integer minute value cannot swallow an
    /// announcement. Each threshold fires at most once per ticket because the
    /// caller records it in `already_notified`.
    pub fn crossed_threshold(
        &self,
        remaining: i64,
        already_notified: &HashSet<i64>,
    ) -> Option<i64> {
        self.thresholds
            .iter()
            .copied()
            .find(|threshold| remaining <= *threshold && !already_notified.contains(threshold))
    }
}
