//! Calendar helpers.
//!
//! Everything here works on local wall-clock values (`NaiveDate`,
//! `NaiveDateTime`). Stored datetimes carry minute precision.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Error, Result};

/// Suffix format appended to a root id to name one of its occurrences.
pub const OCCURRENCE_SUFFIX_FORMAT: &str = "%d%m%Y";

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];
const TIME_FORMAT: &str = "%H:%M";

/// Midnight at the start of `dt`'s calendar day.
pub fn start_of_day(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_time(NaiveTime::MIN)
}

/// Midnight at the start of the day after `date`.
pub fn start_of_next_day(date: NaiveDate) -> NaiveDateTime {
    (date + Duration::days(1)).and_time(NaiveTime::MIN)
}

pub fn same_day(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    a.date() == b.date()
}

/// Keep the time of day of `time_source`, move it onto `day`.
pub fn on_day(day: NaiveDate, time_source: NaiveDateTime) -> NaiveDateTime {
    day.and_time(time_source.time())
}

/// Keep the calendar day of `day_source`, take the time of day of `time_source`.
pub fn with_time_of(day_source: NaiveDateTime, time_source: NaiveDateTime) -> NaiveDateTime {
    day_source.date().and_time(time_source.time())
}

/// Drop seconds and sub-second precision.
pub fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_second(0)
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Whole days from `from` to `to`; negative when `to` is earlier.
pub fn day_delta(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Weekday index with Monday = 0 through Sunday = 6.
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_monday()
}

/// Day of month index, 0-based (the 1st is 0).
pub fn month_day_index(date: NaiveDate) -> u32 {
    date.day0()
}

pub fn occurrence_id(root_id: &str, date: NaiveDate) -> String {
    format!("{root_id}{}", date.format(OCCURRENCE_SUFFIX_FORMAT))
}

pub fn format_time(dt: NaiveDateTime) -> String {
    dt.format(TIME_FORMAT).to_string()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMATS[0]).to_string()
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| Error::InvalidArgument(format!("invalid date '{raw}' (expected YYYY-MM-DD)")))
}

/// Parse `YYYY-MM-DD HH:MM`, `YYYY-MM-DDTHH:MM`, or a bare date (midnight).
pub fn parse_datetime(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(Error::InvalidArgument(format!(
        "invalid datetime '{raw}' (expected YYYY-MM-DD HH:MM)"
    )))
}

/// Parse `HH:MM`.
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|_| Error::InvalidArgument(format!("invalid time '{raw}' (expected HH:MM)")))
}
