//! Recurrence rules.
//!
//! A [`RepeatRule`] decides, for any calendar day, whether its series has an
//! occurrence on that day. Rules are value-like but carry an identity: two
//! rules compare equal only when they share an id, and every write that
//! replaces a rule hands out a fresh one (see [`RepeatRule::rewritten`]).

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dates;
use crate::error::{Error, Result};

const WEEKDAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
const ALL_WEEKDAYS: u8 = 0b111_1111;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepeatClass {
    #[default]
    None,
    Day,
    Week,
    Month,
    Year,
}

impl RepeatClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatClass::None => "none",
            RepeatClass::Day => "day",
            RepeatClass::Week => "week",
            RepeatClass::Month => "month",
            RepeatClass::Year => "year",
        }
    }
}

impl fmt::Display for RepeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "never" => Ok(RepeatClass::None),
            "day" | "daily" => Ok(RepeatClass::Day),
            "week" | "weekly" => Ok(RepeatClass::Week),
            "month" | "monthly" => Ok(RepeatClass::Month),
            "year" | "yearly" => Ok(RepeatClass::Year),
            other => Err(Error::InvalidArgument(format!(
                "Invalid repeat class '{other}'. Expected: none, day, week, month, year"
            ))),
        }
    }
}

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatRule {
    pub id: Uuid,
    #[serde(default)]
    pub class: RepeatClass,
    /// Every N days (day rules) or N years (year rules).
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Bit 0 is Monday, bit 6 is Sunday.
    #[serde(default)]
    pub weekday_mask: u8,
    /// Bit 0 is the 1st, bit 30 is the 31st.
    #[serde(default)]
    pub month_day_mask: u32,
    pub start: NaiveDate,
    /// `None` repeats forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub exclusions: Vec<NaiveDate>,
}

impl PartialEq for RepeatRule {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RepeatRule {}

impl RepeatRule {
    /// A rule that never repeats, anchored on `start`.
    pub fn none(start: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            class: RepeatClass::None,
            interval: 1,
            weekday_mask: 0,
            month_day_mask: 0,
            start,
            end: None,
            exclusions: Vec::new(),
        }
    }

    pub fn daily(start: NaiveDate, interval: u32) -> Self {
        Self {
            class: RepeatClass::Day,
            interval,
            ..Self::none(start)
        }
    }

    pub fn weekly(start: NaiveDate, weekday_mask: u8) -> Self {
        Self {
            class: RepeatClass::Week,
            weekday_mask: weekday_mask & ALL_WEEKDAYS,
            ..Self::none(start)
        }
    }

    pub fn monthly(start: NaiveDate, month_day_mask: u32) -> Self {
        Self {
            class: RepeatClass::Month,
            month_day_mask,
            ..Self::none(start)
        }
    }

    pub fn yearly(start: NaiveDate, interval: u32) -> Self {
        Self {
            class: RepeatClass::Year,
            interval,
            ..Self::none(start)
        }
    }

    /// Same fields, fresh identity.
    pub fn rewritten(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }

    pub fn repeats(&self) -> bool {
        self.class != RepeatClass::None
    }

    pub fn set_start_at(&mut self, at: NaiveDateTime) {
        self.start = at.date();
    }

    pub fn set_end_at(&mut self, at: Option<NaiveDateTime>) {
        self.end = at.map(|at| at.date());
    }

    pub fn exclude(&mut self, day: NaiveDate) {
        if !self.exclusions.contains(&day) {
            self.exclusions.push(day);
        }
    }

    pub fn exclude_at(&mut self, at: NaiveDateTime) {
        self.exclude(at.date());
    }

    pub fn is_excluded(&self, day: NaiveDate) -> bool {
        self.exclusions.contains(&day)
    }

    pub fn fires_on_weekday(&self, index: u32) -> bool {
        index < 7 && self.weekday_mask & (1 << index) != 0
    }

    pub fn fires_on_month_day(&self, index: u32) -> bool {
        index < 31 && self.month_day_mask & (1 << index) != 0
    }

    /// Whether this series has an occurrence on `day`.
    pub fn fires_on(&self, day: NaiveDate) -> bool {
        if self.is_excluded(day) {
            return false;
        }
        if day < self.start {
            return false;
        }
        if let Some(end) = self.end {
            if day > end {
                return false;
            }
        }
        if day == self.start {
            return true;
        }

        match self.class {
            RepeatClass::None => false,
            RepeatClass::Day => {
                self.interval > 0 && dates::day_delta(self.start, day) % i64::from(self.interval) == 0
            }
            RepeatClass::Week => self.fires_on_weekday(dates::weekday_index(day)),
            RepeatClass::Month => self.fires_on_month_day(dates::month_day_index(day)),
            RepeatClass::Year => {
                if self.interval == 0
                    || day.month() != self.start.month()
                    || day.day() != self.start.day()
                {
                    return false;
                }
                let years = day.year() - self.start.year();
                years > 0 && years % self.interval as i32 == 0
            }
        }
    }

    /// Rule shape problems that would make a save meaningless.
    pub fn validate(&self) -> Result<()> {
        match self.class {
            RepeatClass::Day | RepeatClass::Year if self.interval == 0 => Err(Error::Validation(
                "repeat interval must be at least 1".to_string(),
            )),
            _ => match self.end {
                Some(end) if end < self.start => Err(Error::Validation(
                    "repeat end is before its start".to_string(),
                )),
                _ => Ok(()),
            },
        }
    }

    /// Short human description, e.g. `every 2 days` or `weekly on mon, fri`.
    pub fn describe(&self) -> String {
        match self.class {
            RepeatClass::None => "does not repeat".to_string(),
            RepeatClass::Day if self.interval == 1 => "daily".to_string(),
            RepeatClass::Day => format!("every {} days", self.interval),
            RepeatClass::Week => {
                let days: Vec<&str> = (0..7)
                    .filter(|index| self.fires_on_weekday(*index))
                    .map(|index| WEEKDAY_NAMES[index as usize])
                    .collect();
                format!("weekly on {}", days.join(", "))
            }
            RepeatClass::Month => {
                let days: Vec<String> = (0..31)
                    .filter(|index| self.fires_on_month_day(*index))
                    .map(|index| (index + 1).to_string())
                    .collect();
                format!("monthly on {}", days.join(", "))
            }
            RepeatClass::Year if self.interval == 1 => "yearly".to_string(),
            RepeatClass::Year => format!("every {} years", self.interval),
        }
    }
}

/// Parse `mon,wed,fri` (or full names) into a weekday mask.
pub fn parse_weekdays(raw: &str) -> Result<u8> {
    let mut mask = 0u8;
    for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let lower = part.to_lowercase();
        let index = WEEKDAY_NAMES
            .iter()
            .position(|name| lower.starts_with(name))
            .ok_or_else(|| Error::InvalidArgument(format!("invalid weekday '{part}'")))?;
        mask |= 1 << index;
    }
    Ok(mask)
}

/// Parse `1,15,31` into a month-day mask.
pub fn parse_month_days(raw: &str) -> Result<u32> {
    let mut mask = 0u32;
    for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let day: u32 = part
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid day of month '{part}'")))?;
        if !(1..=31).contains(&day) {
            return Err(Error::InvalidArgument(format!(
                "day of month must be 1-31, got {day}"
            )));
        }
        mask |= 1 << (day - 1);
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(raw: &str) -> NaiveDate {
        dates::parse_date(raw).expect("date")
    }

    #[test]
    fn start_day_always_fires() {
        let start = date("2024-01-03");
        let rules = [
            RepeatRule::none(start),
            RepeatRule::daily(start, 5),
            RepeatRule::weekly(start, 0),
            RepeatRule::monthly(start, 0),
            RepeatRule::yearly(start, 3),
        ];
        for rule in rules {
            assert!(rule.fires_on(start), "{:?} must fire on its start", rule.class);
        }
    }

    #[test]
    fn day_interval_fires_on_multiples() {
        let start = date("2024-01-01");
        let rule = RepeatRule::daily(start, 3);
        for offset in 0..30 {
            let day = start + Duration::days(offset);
            assert_eq!(rule.fires_on(day), offset % 3 == 0, "offset {offset}");
        }
    }

    #[test]
    fn weekly_mask_and_exclusion() {
        // 2024-03-04 is a Monday.
        let mut rule = RepeatRule::weekly(date("2024-03-04"), parse_weekdays("mon,wed,fri").expect("mask"));
        rule.exclude(date("2024-03-13"));

        assert!(rule.fires_on(date("2024-03-06")));
        assert!(!rule.fires_on(date("2024-03-07")));
        assert!(rule.fires_on(date("2024-03-08")));
        assert!(!rule.fires_on(date("2024-03-13")));
        assert!(!rule.fires_on(date("2024-03-03")));
    }

    #[test]
    fn month_rule_uses_day_of_month() {
        let rule = RepeatRule::monthly(date("2024-01-10"), parse_month_days("1,31").expect("mask"));
        assert!(rule.fires_on(date("2024-01-31")));
        assert!(rule.fires_on(date("2024-02-01")));
        assert!(!rule.fires_on(date("2024-02-29")));
    }

    #[test]
    fn yearly_requires_exact_anniversary() {
        let rule = RepeatRule::yearly(date("2024-02-29"), 1);
        assert!(!rule.fires_on(date("2025-02-28")));
        assert!(!rule.fires_on(date("2025-03-01")));
        assert!(rule.fires_on(date("2028-02-29")));

        let biennial = RepeatRule::yearly(date("2020-06-15"), 2);
        assert!(!biennial.fires_on(date("2021-06-15")));
        assert!(biennial.fires_on(date("2022-06-15")));
    }

    #[test]
    fn end_bounds_the_series() {
        let mut rule = RepeatRule::daily(date("2024-01-01"), 1);
        rule.set_end_at(Some(dates::parse_datetime("2024-01-05 17:45").expect("dt")));
        assert_eq!(rule.end, Some(date("2024-01-05")));
        assert!(rule.fires_on(date("2024-01-05")));
        assert!(!rule.fires_on(date("2024-01-06")));
    }

    #[test]
    fn zero_interval_never_fires_after_start() {
        let rule = RepeatRule::daily(date("2024-01-01"), 0);
        assert!(!rule.fires_on(date("2024-01-02")));
        assert!(rule.validate().is_err());
    }

    #[test]
    fn identity_equality_ignores_fields() {
        let rule = RepeatRule::daily(date("2024-01-01"), 1);
        let copy = rule.clone();
        let rewritten = rule.rewritten();
        assert_eq!(rule, copy);
        assert_ne!(rule, rewritten);
        assert_eq!(rewritten.interval, rule.interval);
    }

    #[test]
    fn exclusions_survive_json() {
        let mut rule = RepeatRule::weekly(date("2024-03-04"), 0b0010101);
        rule.exclude(date("2024-03-06"));
        let json = serde_json::to_string(&rule).expect("json");
        let back: RepeatRule = serde_json::from_str(&json).expect("parse");
        assert_eq!(back.exclusions, vec![date("2024-03-06")]);
        assert!(!back.fires_on(date("2024-03-06")));
    }

    #[test]
    fn parse_masks_rejects_bad_input() {
        assert!(parse_weekdays("funday").is_err());
        assert!(parse_month_days("0").is_err());
        assert_eq!(parse_weekdays("Monday, sun").expect("mask"), 0b100_0001);
    }
}
