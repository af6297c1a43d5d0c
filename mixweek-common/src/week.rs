//! Calendar-week window math
//!
//! The bot runs once per week and scans the previous calendar week,
//! `[previous_week_start, current_week_start)`, where weeks start on
//! Monday at 00:00:00.000 in the local calendar.

use chrono::{Datelike, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone};
use chrono::{DateTime, Local, Utc};

/// Week boundaries derived from a reference instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    /// Most recent Monday 00:00 at or before the reference instant
    pub current_week_start: NaiveDateTime,
    /// `current_week_start` minus seven days
    pub previous_week_start: NaiveDateTime,
}

impl WeekWindow {
    /// Last calendar day of the previous week (Sunday), used in
    /// human-facing date ranges.
    pub fn previous_week_end(&self) -> NaiveDateTime {
        self.current_week_start - Duration::days(1)
    }
}

/// Resolve the week window for a reference instant.
///
/// A reference that is itself a Monday resolves to that same Monday,
/// regardless of the time of day.
pub fn week_window(reference: NaiveDateTime) -> WeekWindow {
    let days_back = reference.weekday().num_days_from_monday() as i64;
    let monday = reference.date() - Duration::days(days_back);
    let current_week_start = monday.and_time(NaiveTime::MIN);

    WeekWindow {
        current_week_start,
        previous_week_start: current_week_start - Duration::days(7),
    }
}

/// Interpret a local wall-clock instant as UTC.
///
/// Midnight can be ambiguous or missing across DST transitions; the
/// earlier reading wins, and an instant skipped by a transition is
/// read as if the clock had not jumped.
pub fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn midweek_reference_resolves_to_same_weeks_monday() {
        // 2026-08-26 is a Wednesday
        let window = week_window(at(2026, 8, 26, 15, 30));
        assert_eq!(window.current_week_start, at(2026, 8, 24, 0, 0));
        assert_eq!(window.previous_week_start, at(2026, 8, 17, 0, 0));
    }

    #[test]
    fn monday_reference_resolves_to_itself() {
        let window = week_window(at(2026, 8, 24, 0, 0));
        assert_eq!(window.current_week_start, at(2026, 8, 24, 0, 0));

        // Later the same Monday still resolves to that Monday
        let window = week_window(at(2026, 8, 24, 23, 59));
        assert_eq!(window.current_week_start, at(2026, 8, 24, 0, 0));
    }

    #[test]
    fn sunday_reference_resolves_to_preceding_monday() {
        // 2026-08-30 is a Sunday
        let window = week_window(at(2026, 8, 30, 12, 0));
        assert_eq!(window.current_week_start, at(2026, 8, 24, 0, 0));
    }

    #[test]
    fn previous_week_end_is_day_before_current_start() {
        let window = week_window(at(2026, 8, 26, 9, 0));
        assert_eq!(window.previous_week_end(), at(2026, 8, 23, 0, 0));
    }

    #[test]
    fn window_spans_exactly_seven_days() {
        let window = week_window(at(2026, 1, 2, 8, 0));
        let span = window.current_week_start - window.previous_week_start;
        assert_eq!(span, Duration::days(7));
    }
}
