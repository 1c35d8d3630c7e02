//! Task records.
//!
//! A [`Task`] is either a standalone item or one occurrence of a repeating
//! series. Series membership is expressed with id references (`parent`,
//! `prev`, `next`) that are resolved through the
//! [`WorkingSet`](crate::store::WorkingSet), never with owning pointers.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

use crate::dates;
use crate::error::{Error, Result};
use crate::repeat::RepeatRule;
use crate::timedelta::Timedelta;

pub const DEFAULT_ICON: &str = "questionmark.circle.fill";

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

fn default_units() -> i64 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Done or not done.
    #[default]
    Single,
    /// A checklist; progress counts ticked sub-items.
    Multi,
    /// A numeric target advanced in fixed steps.
    Goal,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Single => "single",
            TaskKind::Multi => "multi",
            TaskKind::Goal => "goal",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" | "single_part" => Ok(TaskKind::Single),
            "multi" | "multi_part" | "checklist" => Ok(TaskKind::Multi),
            "goal" => Ok(TaskKind::Goal),
            other => Err(Error::InvalidArgument(format!(
                "Invalid task kind '{other}'. Expected: single, multi, goal"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubItem {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

impl SubItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            completed: false,
        }
    }
}

/// Sub-items with a non-blank title.
pub fn fixed_list(items: &[SubItem]) -> Vec<SubItem> {
    items
        .iter()
        .filter(|item| !item.title.trim().is_empty())
        .cloned()
        .collect()
}

/// Copies of `items` under fresh ids.
pub fn recreated(items: &[SubItem], keep_completion: bool) -> Vec<SubItem> {
    items
        .iter()
        .map(|item| SubItem {
            id: Uuid::new_v4(),
            title: item.title.clone(),
            completed: keep_completion && item.completed,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub title: String,
}

impl Category {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
        }
    }
}

/// Generate an id for a new root or standalone task.
pub fn generate_task_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub progress: i64,
    #[serde(default = "default_units")]
    pub completed_units: i64,
    #[serde(default = "default_units")]
    pub progress_step: i64,
    #[serde(default)]
    pub sub_items: Vec<SubItem>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub created_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDateTime>,
    pub modified_at: NaiveDateTime,
    #[serde(default)]
    pub date_scheduled: bool,
    #[serde(default)]
    pub time_scheduled: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub autocomplete: bool,
    pub rule: RepeatRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default)]
    pub is_child: bool,
    #[serde(default)]
    pub reminders: Vec<Timedelta>,
    #[serde(default)]
    pub categories: Vec<Uuid>,
}

impl Task {
    /// A standalone, single-part, unscheduled task.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Self {
        let start = dates::truncate_to_minute(start);
        let now = dates::truncate_to_minute(now);
        Self {
            id: id.into(),
            title: title.into(),
            notes: String::new(),
            icon: default_icon(),
            kind: TaskKind::Single,
            progress: 0,
            completed_units: 1,
            progress_step: 1,
            sub_items: Vec::new(),
            start,
            end: dates::truncate_to_minute(end),
            created_at: now,
            completed_at: None,
            modified_at: now,
            date_scheduled: false,
            time_scheduled: false,
            locked: false,
            autocomplete: false,
            rule: RepeatRule::none(start.date()),
            parent: None,
            prev: None,
            next: None,
            is_child: false,
            reminders: Vec::new(),
            categories: Vec::new(),
        }
    }

    /// Re-establish field invariants after loading or bulk edits.
    pub fn normalize(&mut self) {
        self.start = dates::truncate_to_minute(self.start);
        self.end = dates::truncate_to_minute(self.end);
        self.created_at = dates::truncate_to_minute(self.created_at);
        match self.kind {
            TaskKind::Single => self.completed_units = 1,
            TaskKind::Multi => self.sync_sub_item_progress(),
            TaskKind::Goal => {}
        }
        if self.progress_step <= 0 {
            self.progress_step = 1;
        }
    }

    pub fn does_repeat(&self) -> bool {
        self.rule.repeats()
    }

    /// A parentless record that owns a repeating rule.
    pub fn is_series_root(&self) -> bool {
        !self.is_child && self.does_repeat()
    }

    pub fn start_day(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn set_start(&mut self, start: NaiveDateTime) {
        self.start = dates::truncate_to_minute(start);
    }

    pub fn set_end(&mut self, end: NaiveDateTime) {
        self.end = dates::truncate_to_minute(end);
    }

    /// Replace the checklist; multi-part tasks derive their progress from it.
    pub fn set_sub_items(&mut self, items: Vec<SubItem>) {
        self.sub_items = items;
        if self.kind == TaskKind::Multi {
            self.sync_sub_item_progress();
        }
    }

    fn sync_sub_item_progress(&mut self) {
        self.completed_units = self.sub_items.len() as i64;
        self.progress = self.sub_items.iter().filter(|item| item.completed).count() as i64;
    }

    pub fn decimal_progress(&self) -> f64 {
        if self.completed_units <= 0 {
            return 0.0;
        }
        self.progress as f64 / self.completed_units as f64
    }

    pub fn is_completed(&self) -> bool {
        self.completed_units > 0 && self.progress >= self.completed_units
    }

    /// Completion including autocomplete of finished timeline items.
    pub fn is_completed_at(&self, now: NaiveDateTime) -> bool {
        self.is_completed() || (self.autocomplete && self.time_scheduled && self.end < now)
    }

    /// Advance progress one step according to the task kind.
    pub fn advance(&mut self, now: NaiveDateTime) {
        match self.kind {
            TaskKind::Single => {
                self.completed_units = 1;
                self.progress = if self.progress != 1 { 1 } else { 0 };
            }
            TaskKind::Multi => {
                if self.is_completed() {
                    for item in &mut self.sub_items {
                        item.completed = false;
                    }
                } else if let Some(item) = self.sub_items.iter_mut().find(|item| !item.completed) {
                    item.completed = true;
                }
                self.sync_sub_item_progress();
            }
            TaskKind::Goal => {
                self.progress += self.progress_step;
            }
        }

        self.completed_at = if self.is_completed() {
            Some(dates::truncate_to_minute(now))
        } else {
            None
        };
        self.modified_at = now;
    }

    /// `p/u` for multi-part and goal tasks, empty for single-part ones.
    pub fn completion_text(&self) -> String {
        match self.kind {
            TaskKind::Single => String::new(),
            TaskKind::Multi | TaskKind::Goal => {
                format!("{}/{}", self.progress, self.completed_units)
            }
        }
    }

    /// Title of the next unticked sub-item.
    pub fn current_goal(&self) -> Option<&str> {
        self.sub_items
            .iter()
            .find(|item| !item.completed)
            .map(|item| item.title.as_str())
    }

    /// `HH:MM` or `HH:MM - HH:MM`; empty unless time-scheduled.
    pub fn time_stamp(&self) -> String {
        if !self.time_scheduled {
            return String::new();
        }
        if self.start.time() == self.end.time() {
            return dates::format_time(self.start);
        }
        format!(
            "{} - {}",
            dates::format_time(self.start),
            dates::format_time(self.end)
        )
    }

    /// Fraction of `[start, end]` elapsed at `now`, clamped to `0.0..=1.0`.
    pub fn percent_time_passed(&self, now: NaiveDateTime) -> f64 {
        if now < self.start {
            return 0.0;
        }
        let total = (self.end - self.start).num_seconds();
        let passed = (now - self.start).num_seconds();
        if total <= 0 {
            return 1.0;
        }
        (passed as f64 / total as f64).min(1.0)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Copy this record as the occurrence of series `root_id` on `day`.
    ///
    /// The copy keeps this record's time of day, gets a derived id and a fresh
    /// rule identity, and starts without links. Progress and checklist state
    /// carry over only when `inherit_progress` is set.
    pub fn spawn_occurrence(
        &self,
        root_id: &str,
        day: NaiveDate,
        now: NaiveDateTime,
        inherit_progress: bool,
    ) -> Task {
        let mut occurrence = self.clone();
        occurrence.id = dates::occurrence_id(root_id, day);
        occurrence.start = dates::on_day(day, self.start);
        occurrence.end = dates::on_day(day, self.start) + self.duration();
        occurrence.created_at = dates::truncate_to_minute(now);
        occurrence.modified_at = now;
        occurrence.completed_at = None;
        occurrence.rule = self.rule.rewritten();
        occurrence.parent = Some(root_id.to_string());
        occurrence.prev = None;
        occurrence.next = None;
        occurrence.is_child = true;
        occurrence.sub_items = recreated(&self.sub_items, inherit_progress);
        occurrence.progress = if inherit_progress { self.progress } else { 0 };
        if occurrence.kind == TaskKind::Multi {
            occurrence.sync_sub_item_progress();
        }
        if inherit_progress && occurrence.is_completed() {
            occurrence.completed_at = self.completed_at;
        }
        occurrence
    }
}
