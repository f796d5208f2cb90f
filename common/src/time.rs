//! Time utilities for Gera.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

/// A timestamp (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check whether `since` lies more than `period` before `at`.
pub fn is_older_than(since: Timestamp, period: Duration, at: Timestamp) -> bool {
    at.signed_duration_since(since) > period
}

/// Business days are Monday through Friday.
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The closest business day strictly before `date`.
pub fn previous_business_day(date: NaiveDate) -> NaiveDate {
    let mut day = date - Duration::days(1);
    while !is_business_day(day) {
        day -= Duration::days(1);
    }
    day
}

/// The closest business day strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut day = date + Duration::days(1);
    while !is_business_day(day) {
        day += Duration::days(1);
    }
    day
}
