//! Minute-granularity durations used for reminder offsets and shunting.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;

/// A signed count of minutes.
///
/// Components are derived with Euclidean division, so
/// `days() * 1440 + hours() * 60 + minutes() == total_minutes()` for every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timedelta {
    minutes: i64,
}

impl Timedelta {
    pub const ZERO: Timedelta = Timedelta { minutes: 0 };

    pub fn from_minutes(minutes: i64) -> Self {
        Self { minutes }
    }

    pub fn new(days: i64, hours: i64, minutes: i64) -> Self {
        Self {
            minutes: days * MINUTES_PER_DAY + hours * MINUTES_PER_HOUR + minutes,
        }
    }

    pub fn total_minutes(&self) -> i64 {
        self.minutes
    }

    pub fn days(&self) -> i64 {
        self.minutes.div_euclid(MINUTES_PER_DAY)
    }

    pub fn hours(&self) -> i64 {
        self.minutes.rem_euclid(MINUTES_PER_DAY) / MINUTES_PER_HOUR
    }

    pub fn minutes(&self) -> i64 {
        self.minutes.rem_euclid(MINUTES_PER_HOUR)
    }

    pub fn set_days(&mut self, days: i64) {
        *self = Self::new(days, self.hours(), self.minutes());
    }

    pub fn set_hours(&mut self, hours: i64) {
        *self = Self::new(self.days(), hours, self.minutes());
    }

    pub fn set_minutes(&mut self, minutes: i64) {
        *self = Self::new(self.days(), self.hours(), minutes);
    }

    pub fn is_zero(&self) -> bool {
        self.minutes == 0
    }

    pub fn is_negative(&self) -> bool {
        self.minutes < 0
    }

    pub fn abs(&self) -> Self {
        Self::from_minutes(self.minutes.abs())
    }

    pub fn as_duration(&self) -> Duration {
        Duration::minutes(self.minutes)
    }

    /// Human rendering such as `"1 day 2 hrs 30 mins"`, or `default` when zero.
    pub fn time_string(&self, default: &str) -> String {
        if self.is_zero() {
            return default.to_string();
        }

        let magnitude = self.abs();
        let mut parts = Vec::new();
        if magnitude.days() > 0 {
            parts.push(pluralize(magnitude.days(), "day"));
        }
        if magnitude.hours() > 0 {
            parts.push(pluralize(magnitude.hours(), "hr"));
        }
        if magnitude.minutes() > 0 {
            parts.push(pluralize(magnitude.minutes(), "min"));
        }

        let rendered = parts.join(" ");
        if self.is_negative() {
            format!("-{rendered}")
        } else {
            rendered
        }
    }
}

fn pluralize(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

impl fmt::Display for Timedelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.time_string("0m"))
    }
}

impl FromStr for Timedelta {
    type Err = Error;

    /// Accepts `90`, `45m`, `2h30m`, `1d 3h`, `-15m`. Bare numbers are minutes.
    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
        }

        let (negative, body) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, raw),
        };

        let mut total: i64 = 0;
        let mut rest = body;
        while !rest.is_empty() {
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let (num_str, tail) = rest.split_at(digits_end);
            let num: i64 = num_str.parse().map_err(|_| {
                Error::InvalidArgument(format!("Invalid duration number in '{raw}'"))
            })?;

            let unit_end = tail
                .find(|c: char| c.is_ascii_digit() || c.is_whitespace())
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_end);
            let scale = match unit.to_lowercase().as_str() {
                "" | "m" | "min" | "mins" | "minute" | "minutes" => 1,
                "h" | "hr" | "hrs" | "hour" | "hours" => MINUTES_PER_HOUR,
                "d" | "day" | "days" => MINUTES_PER_DAY,
                "w" | "week" | "weeks" => 7 * MINUTES_PER_DAY,
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "Invalid duration unit '{unit}'. Expected: m, h, d, w"
                    )));
                }
            };

            total += num * scale;
            rest = tail.trim_start();
        }

        Ok(Self::from_minutes(if negative { -total } else { total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_decompose_total() {
        let delta = Timedelta::from_minutes(150);
        assert_eq!(delta.days(), 0);
        assert_eq!(delta.hours(), 2);
        assert_eq!(delta.minutes(), 30);
        assert_eq!(delta.time_string("0m"), "2 hrs 30 mins");
    }

    #[test]
    fn negative_components_still_recompose() {
        let delta = Timedelta::from_minutes(-30);
        assert_eq!(
            delta.days() * 1440 + delta.hours() * 60 + delta.minutes(),
            -30
        );
        assert_eq!(delta.time_string("0m"), "-30 mins");
    }

    #[test]
    fn rendering_uses_singular_and_default() {
        assert_eq!(Timedelta::new(1, 1, 1).time_string("0m"), "1 day 1 hr 1 min");
        assert_eq!(Timedelta::ZERO.time_string("none"), "none");
        assert_eq!(Timedelta::new(2, 0, 0).to_string(), "2 days");
    }

    #[test]
    fn setters_replace_single_component() {
        let mut delta = Timedelta::new(1, 2, 3);
        delta.set_hours(5);
        assert_eq!(delta, Timedelta::new(1, 5, 3));
        delta.set_days(0);
        delta.set_minutes(0);
        assert_eq!(delta.total_minutes(), 300);
    }

    #[test]
    fn parses_compact_forms() {
        assert_eq!("90".parse::<Timedelta>().expect("bare"), Timedelta::from_minutes(90));
        assert_eq!("2h30m".parse::<Timedelta>().expect("compound"), Timedelta::from_minutes(150));
        assert_eq!("1d 3h".parse::<Timedelta>().expect("spaced"), Timedelta::new(1, 3, 0));
        assert_eq!("-15m".parse::<Timedelta>().expect("negative"), Timedelta::from_minutes(-15));
        assert!("".parse::<Timedelta>().is_err());
        assert!("3 fortnights".parse::<Timedelta>().is_err());
    }

    #[test]
    fn serializes_as_minutes() {
        let json = serde_json::to_string(&Timedelta::from_minutes(45)).expect("json");
        assert_eq!(json, "45");
        let back: Timedelta = serde_json::from_str("45").expect("parse");
        assert_eq!(back.total_minutes(), 45);
    }
}
