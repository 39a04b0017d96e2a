//! The weekly report: aggregates last week's support activity and SLA
//! violations and broadcasts a formatted summary every Sunday evening.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;

use crate::{
    calendar::resolve_local,
    models::{SupportActivity, Ticket},
    notification::Notifier,
    persistence::{
        error::PersistenceError,
        traits::{StaffRepository, TicketRepository},
    },
};

const REPORT_WEEKDAY: Weekday = Weekday::Sun;
const REPORT_TIME: NaiveTime = crate::calendar::time_of_day(20, 0);

/// Builds and delivers the weekly activity and SLA-violation report.
pub struct WeeklyReporter {
    tickets: Arc<dyn TicketRepository>,
    staff: Arc<dyn StaffRepository>,
    notifier: Arc<dyn Notifier>,
    tz: Tz,
    audience: i64,
    cancellation_token: CancellationToken,
}

impl WeeklyReporter {
    /// Creates a reporter delivering to the given audience in the given
    /// local timezone.
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        staff: Arc<dyn StaffRepository>,
        notifier: Arc<dyn Notifier>,
        tz: Tz,
        audience: i64,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { tickets, staff, notifier, tz, audience, cancellation_token }
    }

    /// Runs the scheduler loop: sleep until the next Sunday 20:00 local,
    /// send the report, repeat.
    pub async fn run(self) {
        loop {
            let now = Utc::now();
            let next_at = self.next_report_instant(now);
            let wait = (next_at - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next_report_at = %next_at, "Weekly reporter sleeping until next report.");

            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Weekly reporter cancellation signal received, shutting down...");
                    break;
                }

                _ = tokio::time::sleep(wait) => {
                    if let Err(error) = self.send_report().await {
                        tracing::error!(error = %error, "Failed to build weekly report.");
                    }
                }
            }
        }
        tracing::info!("Weekly reporter has shut down.");
    }

    /// Builds the report over the trailing week and broadcasts it.
    ///
    /// Delivery failures are logged and swallowed, as everywhere else.
    pub async fn send_report(&self) -> Result<(), PersistenceError> {
        tracing::info!("Building weekly report.");
        let now = Utc::now();
        let since = now - chrono::Duration::days(7);

        let activity = self.staff.support_activity_since(since).await?;
        let violations = self.tickets.overdue_tickets_since(since).await?;
        let text = self.format_report(&activity, &violations, now);

        if let Err(error) = self.notifier.broadcast(self.audience, &text).await {
            tracing::error!(error = %error, "Failed to deliver weekly report.");
        } else {
            tracing::info!("Weekly report delivered.");
        }
        Ok(())
    }

    /// The first Sunday 20:00 local strictly after `now`.
    fn next_report_instant(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.tz);
        let mut date = local.date_naive();
        for _ in 0..=7 {
            if date.weekday() == REPORT_WEEKDAY {
                let candidate = resolve_local(&self.tz, date.and_time(REPORT_TIME));
                if candidate > local {
                    return candidate.with_timezone(&Utc);
                }
            }
            let Some(next) = date.succ_opt() else { break };
            date = next;
        }
        // Unreachable short of date arithmetic overflow at the end of time.
        now + chrono::Duration::days(7)
    }

    fn format_report(
        &self,
        activity: &[SupportActivity],
        violations: &[Ticket],
        now: DateTime<Utc>,
    ) -> String {
        let mut report = format!(
            "📝 Weekly report for the week ending {}:\n\n",
            now.with_timezone(&self.tz).format("%d.%m.%Y")
        );

        report.push_str("Support staff activity:\n");
        let total_responses: i64 = activity.iter().map(|row| row.responses).sum();
        if total_responses > 0 {
            for row in activity {
                let username = row.username.as_deref().unwrap_or("unknown");
                let percentage = row.responses as f64 / total_responses as f64 * 100.0;
                report.push_str(&format!(
                    "{}: {} responses ({:.2}%)\n",
                    username, row.responses, percentage
                ));
            }
        } else {
            report.push_str("No staff activity over the past week.\n");
        }

        report.push_str(&format!("\nSLA violations: {}\n", violations.len()));
        if violations.is_empty() {
            report.push_str("No SLA violations over the past week.\n");
        } else {
            for ticket in violations {
                let breached_at = ticket.closed_at.unwrap_or(ticket.created_at);
                report.push_str(&format!(
                    "- Chat \"{}\", breached at {}\n",
                    ticket.title,
                    breached_at.with_timezone(&self.tz).format("%Y-%m-%d %H:%M:%S")
                ));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Europe::Moscow;

    use super::*;
    use crate::{
        persistence::traits::{MockStaffRepository, MockTicketRepository},
        test_helpers::{RecordingNotifier, TicketBuilder},
    };

    const AUDIENCE: i64 = -100;

    fn reporter(
        tickets: MockTicketRepository,
        staff: MockStaffRepository,
        notifier: Arc<RecordingNotifier>,
    ) -> WeeklyReporter {
        WeeklyReporter::new(
            Arc::new(tickets),
            Arc::new(staff),
            notifier,
            Moscow,
            AUDIENCE,
            CancellationToken::new(),
        )
    }

    fn activity(username: &str, responses: i64) -> SupportActivity {
        SupportActivity {
            user_id: 1,
            username: Some(username.to_string()),
            responses,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_report_includes_activity_shares_and_violations() {
        let mut tickets = MockTicketRepository::new();
        tickets.expect_overdue_tickets_since().returning(|_| {
            Ok(vec![TicketBuilder::new().id(1).chat_id(10).title("Acme support").closed().build()])
        });
        let mut staff = MockStaffRepository::new();
        staff
            .expect_support_activity_since()
            .returning(|_| Ok(vec![activity("alice", 3), activity("bob", 1)]));

        let notifier = RecordingNotifier::new();
        reporter(tickets, staff, notifier.clone()).send_report().await.unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, AUDIENCE);
        let text = &sent[0].1;
        assert!(text.contains("alice: 3 responses (75.00%)"));
        assert!(text.contains("bob: 1 responses (25.00%)"));
        assert!(text.contains("SLA violations: 1"));
        assert!(text.contains("Chat \"Acme support\""));
    }

    #[tokio::test]
    async fn test_report_handles_a_quiet_week() {
        let mut tickets = MockTicketRepository::new();
        tickets.expect_overdue_tickets_since().returning(|_| Ok(vec![]));
        let mut staff = MockStaffRepository::new();
        staff.expect_support_activity_since().returning(|_| Ok(vec![]));

        let notifier = RecordingNotifier::new();
        reporter(tickets, staff, notifier.clone()).send_report().await.unwrap();

        let text = &notifier.sent()[0].1;
        assert!(text.contains("No staff activity over the past week."));
        assert!(text.contains("No SLA violations over the past week."));
    }

    #[test]
    fn test_next_report_instant_is_the_coming_sunday_evening() {
        let reporter = reporter(
            MockTicketRepository::new(),
            MockStaffRepository::new(),
            RecordingNotifier::new(),
        );

        // 2024-03-01 is a Friday; the next report lands Sunday 2024-03-03.
        let friday = Moscow.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap().with_timezone(&Utc);
        let next = reporter.next_report_instant(friday);
        assert_eq!(next, Moscow.with_ymd_and_hms(2024, 3, 3, 20, 0, 0).unwrap());

        // At 20:00 sharp the next report is a week out.
        let sunday_evening =
            Moscow.with_ymd_and_hms(2024, 3, 3, 20, 0, 0).unwrap().with_timezone(&Utc);
        let next = reporter.next_report_instant(sunday_evening);
        assert_eq!(next, Moscow.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap());
    }
}
