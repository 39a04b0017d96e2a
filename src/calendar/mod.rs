//! Working-calendar primitives for the SLA clock.
//!
//! The calendar answers three questions: whether an instant falls inside a
//! working window, when the next working period starts, and how many working
//! minutes elapse between two instants. All arithmetic happens in the
//! configured calendar timezone; instants crossing the API boundary are UTC.

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

/// Errors produced when constructing a [`WorkingCalendar`].
#[derive(Debug, Error)]
pub enum CalendarError {
    /// A window whose start does not precede its end has no working time.
    #[error("empty working window: start {start} must precede end {end}")]
    EmptyWindow {
        /// Configured window start.
        start: NaiveTime,
        /// Configured window end.
        end: NaiveTime,
    },
}

/// Builds a time of day from compile-time constants.
pub(crate) const fn time_of_day(hour: u32, minute: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(time) => time,
        None => panic!("invalid time-of-day constant"),
    }
}

/// A daily working window, half-open on `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WorkingWindow {
    /// Time of day the window opens.
    #[serde(deserialize_with = "crate::config::deserialize_time_of_day")]
    pub start: NaiveTime,
    /// Time of day the window closes (exclusive).
    #[serde(deserialize_with = "crate::config::deserialize_time_of_day")]
    pub end: NaiveTime,
}

impl WorkingWindow {
    /// Creates a window, rejecting empty or inverted ranges.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, CalendarError> {
        if start >= end {
            return Err(CalendarError::EmptyWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Whether a time of day falls inside the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }
}

/// Resolves a naive local datetime in `tz`, preferring the earliest valid
/// instant around DST transitions.
pub(crate) fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // The wall clock skipped this time; the instant effectively occurs
        // once the gap ends.
        LocalResult::None => {
            match tz.from_local_datetime(&(naive + chrono::Duration::hours(1))) {
                LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _) => instant,
                LocalResult::None => tz.from_utc_datetime(&naive),
            }
        }
    }
}

/// The weekday/weekend working calendar driving the SLA clock.
///
/// Stateless and free of I/O: the same inputs always produce the same
/// answers, which is what makes the deadline clock reproducible across
/// suspend/resume cycles.
#[derive(Debug, Clone)]
pub struct WorkingCalendar {
    tz: Tz,
    weekday: WorkingWindow,
    weekend: WorkingWindow,
}

impl WorkingCalendar {
    /// Creates a calendar for the given timezone and windows.
    ///
    /// Windows deserialized from configuration bypass [`WorkingWindow::new`],
    /// so both are re-validated here.
    pub fn new(
        tz: Tz,
        weekday: WorkingWindow,
        weekend: WorkingWindow,
    ) -> Result<Self, CalendarError> {
        let weekday = WorkingWindow::new(weekday.start, weekday.end)?;
        let weekend = WorkingWindow::new(weekend.start, weekend.end)?;
        Ok(Self { tz, weekday, weekend })
    }

    /// The calendar timezone.
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    fn window_for(&self, weekday: Weekday) -> &WorkingWindow {
        match weekday {
            Weekday::Sat | Weekday::Sun => &self.weekend,
            _ => &self.weekday,
        }
    }

    /// Whether the instant falls inside the working window of its local day.
    pub fn is_working_instant(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.tz);
        self.window_for(local.weekday()).contains(local.time())
    }

    /// The first window-start instant strictly after `instant`.
    ///
    /// Every day has a working window, so the scan terminates within two
    /// iterations; the bound of 7 keeps the loop obviously finite.
    pub fn next_working_period_start(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local = instant.with_timezone(&self.tz);
        let mut date = local.date_naive();
        for _ in 0..=7 {
            let window = self.window_for(date.weekday());
            let start = resolve_local(&self.tz, date.and_time(window.start));
            if start > local {
                return start.with_timezone(&Utc);
            }
            let Some(next) = date.succ_opt() else { break };
            date = next;
        }
        // Unreachable short of date arithmetic overflow at the end of time.
        instant
    }

    /// Working minutes elapsed between `from` and `to` (`from <= to`).
    ///
    /// Walks day boundaries in the calendar timezone: the pointer is clamped
    /// forward to the window start, skipped to the next day's midnight at or
    /// after the window end, and otherwise advanced to `min(to, window end)`
    /// while accumulating the covered minutes. Returns 0 for equal instants.
    pub fn working_minutes_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        let to = to.with_timezone(&self.tz);
        let mut cursor = from.with_timezone(&self.tz);
        let mut total = 0.0;

        while cursor < to {
            let date = cursor.date_naive();
            let window = self.window_for(date.weekday());
            let open = resolve_local(&self.tz, date.and_time(window.start));
            let close = resolve_local(&self.tz, date.and_time(window.end));

            if cursor < open {
                cursor = open;
                continue;
            }
            if cursor >= close {
                let Some(next) = date.succ_opt() else { break };
                cursor = resolve_local(&self.tz, next.and_time(NaiveTime::MIN));
                continue;
            }

            let slice_end = std::cmp::min(to, close);
            total += (slice_end - cursor).num_seconds() as f64 / 60.0;
            cursor = slice_end;
        }

        total
    }
}

#[cfg(test)]
mod tests {
    use chrono_tz::Europe::Moscow;

    use super::*;

    fn calendar() -> WorkingCalendar {
        WorkingCalendar::new(
            Moscow,
            WorkingWindow::new(time_of_day(7, 0), time_of_day(23, 0)).unwrap(),
            WorkingWindow::new(time_of_day(10, 0), time_of_day(19, 0)).unwrap(),
        )
        .unwrap()
    }

    /// 2024-03-01 is a Friday.
    fn moscow(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Moscow
            .with_ymd_and_hms(2024, 3, day, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn window_rejects_empty_and_inverted_ranges() {
        assert!(WorkingWindow::new(time_of_day(7, 0), time_of_day(7, 0)).is_err());
        assert!(WorkingWindow::new(time_of_day(23, 0), time_of_day(7, 0)).is_err());
        assert!(WorkingWindow::new(time_of_day(7, 0), time_of_day(23, 0)).is_ok());
    }

    #[test]
    fn working_instant_respects_half_open_windows() {
        let calendar = calendar();

        // Friday: weekday window 07:00-23:00.
        assert!(!calendar.is_working_instant(moscow(1, 6, 59)));
        assert!(calendar.is_working_instant(moscow(1, 7, 0)));
        assert!(calendar.is_working_instant(moscow(1, 22, 59)));
        assert!(!calendar.is_working_instant(moscow(1, 23, 0)));

        // Saturday: weekend window 10:00-19:00.
        assert!(!calendar.is_working_instant(moscow(2, 9, 59)));
        assert!(calendar.is_working_instant(moscow(2, 10, 0)));
        assert!(calendar.is_working_instant(moscow(2, 18, 59)));
        assert!(!calendar.is_working_instant(moscow(2, 19, 0)));
    }

    #[test]
    fn next_start_after_friday_close_is_saturday_open() {
        let calendar = calendar();
        let resumed = calendar.next_working_period_start(moscow(1, 23, 30));
        assert_eq!(resumed, moscow(2, 10, 0));
        assert!(calendar.is_working_instant(resumed));
    }

    #[test]
    fn next_start_is_strictly_after_a_window_start() {
        let calendar = calendar();
        // Monday 07:00 is itself a window start; the next one is Tuesday's.
        let monday_open = moscow(4, 7, 0);
        assert_eq!(calendar.next_working_period_start(monday_open), moscow(5, 7, 0));
    }

    #[test]
    fn next_start_before_todays_window_is_today() {
        let calendar = calendar();
        assert_eq!(calendar.next_working_period_start(moscow(2, 4, 0)), moscow(2, 10, 0));
    }

    #[test]
    fn zero_width_interval_counts_nothing() {
        let calendar = calendar();
        assert_eq!(calendar.working_minutes_between(moscow(1, 12, 0), moscow(1, 12, 0)), 0.0);
    }

    #[test]
    fn minutes_within_a_single_window() {
        let calendar = calendar();
        assert_eq!(calendar.working_minutes_between(moscow(1, 12, 0), moscow(1, 12, 45)), 45.0);
    }

    #[test]
    fn minutes_suspend_across_friday_close_and_resume_saturday() {
        let calendar = calendar();
        // Friday 22:50 to Saturday 10:00: only the 10 minutes before the
        // Friday close count; the overnight gap is suspended.
        assert_eq!(calendar.working_minutes_between(moscow(1, 22, 50), moscow(2, 10, 0)), 10.0);
        // Ten more working minutes into Saturday.
        assert_eq!(calendar.working_minutes_between(moscow(1, 22, 50), moscow(2, 10, 10)), 20.0);
    }

    #[test]
    fn interval_entirely_outside_a_window_counts_nothing() {
        let calendar = calendar();
        // Saturday pre-dawn, hours before the weekend window opens.
        assert_eq!(calendar.working_minutes_between(moscow(2, 5, 0), moscow(2, 6, 0)), 0.0);
        // Friday night after close, before Saturday open.
        assert_eq!(calendar.working_minutes_between(moscow(1, 23, 15), moscow(2, 9, 0)), 0.0);
    }

    #[test]
    fn minutes_are_additive_over_a_midpoint() {
        let calendar = calendar();
        let t1 = moscow(1, 22, 0);
        let t2 = moscow(2, 5, 0);
        let t3 = moscow(2, 12, 0);

        let whole = calendar.working_minutes_between(t1, t3);
        let first = calendar.working_minutes_between(t1, t2);
        let second = calendar.working_minutes_between(t2, t3);

        assert_eq!(first, 60.0);
        assert_eq!(second, 120.0);
        assert_eq!(whole, first + second);
    }

    #[test]
    fn full_week_accumulates_both_window_shapes() {
        let calendar = calendar();
        // Monday 07:00 to the next Monday 07:00: five 16-hour weekdays and
        // two 9-hour weekend days.
        let start = moscow(4, 7, 0);
        let end = moscow(11, 7, 0);
        assert_eq!(
            calendar.working_minutes_between(start, end),
            (5 * 16 * 60 + 2 * 9 * 60) as f64
        );
    }
}
