//! Simulated calendar: every round spans one month of each agent's personal time.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

/// Last calendar day of `now`'s month, keeping the time of day.
pub fn reflection_day(now: NaiveDateTime) -> NaiveDateTime {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let last_day = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or_else(|| now.date());
    last_day.and_time(now.time())
}

/// The day before [`reflection_day`], when the group meets to talk.
pub fn discussion_day(now: NaiveDateTime) -> NaiveDateTime {
    reflection_day(now) - Duration::days(1)
}

/// Contextual events stay visible until the end of the month they were created in.
pub fn event_expiration(now: NaiveDateTime) -> NaiveDateTime {
    reflection_day(now)
}
