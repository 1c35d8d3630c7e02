//! Scoped edits and deletes across repeating series.
//!
//! Editing or deleting one occurrence of a series is ambiguous: it may mean
//! just that day, that day and everything after it, or the whole series.
//! The functions here never guess. When a scope is needed and none was given
//! they return [`Outcome::NeedsScope`] without touching the working set; the
//! caller asks the user and calls again with an [`EditScope`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dates;
use crate::error::{Error, Result};
use crate::repeat::{RepeatClass, RepeatRule};
use crate::store::WorkingSet;
use crate::task::{self, SubItem, Task, TaskKind};
use crate::timedelta::Timedelta;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EditScope {
    /// Only the chosen occurrence; it leaves the series.
    This,
    /// The chosen occurrence, every later one, and the series root.
    Future,
    /// Every occurrence and the series root.
    All,
    Cancel,
}

impl EditScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditScope::This => "this",
            EditScope::Future => "future",
            EditScope::All => "all",
            EditScope::Cancel => "cancel",
        }
    }
}

impl fmt::Display for EditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "this" | "single" | "one" => Ok(EditScope::This),
            "future" | "this_and_future" => Ok(EditScope::Future),
            "all" => Ok(EditScope::All),
            "cancel" => Ok(EditScope::Cancel),
            other => Err(Error::InvalidArgument(format!(
                "Invalid scope '{other}'. Expected: this, future, all, cancel"
            ))),
        }
    }
}

/// Result of a scoped operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    /// The task belongs to a series; call again with a scope.
    NeedsScope { task_id: String },
}

impl<T> Outcome<T> {
    /// Convert a scope request into [`Error::ScopeRequired`].
    pub fn require_applied(self) -> Result<T> {
        match self {
            Outcome::Applied(value) => Ok(value),
            Outcome::NeedsScope { task_id } => Err(Error::ScopeRequired(task_id)),
        }
    }
}

/// Every user-editable field of a task.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    /// `None` creates a new task.
    pub id: Option<String>,
    pub title: String,
    pub notes: String,
    pub icon: String,
    pub kind: TaskKind,
    pub progress: i64,
    pub completed_units: i64,
    pub progress_step: i64,
    pub sub_items: Vec<SubItem>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub date_scheduled: bool,
    pub time_scheduled: bool,
    pub locked: bool,
    pub autocomplete: bool,
    pub rule: RepeatRule,
    pub reminders: Vec<Timedelta>,
    pub categories: Vec<Uuid>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            id: None,
            title: title.into(),
            notes: String::new(),
            icon: task::DEFAULT_ICON.to_string(),
            kind: TaskKind::Single,
            progress: 0,
            completed_units: 1,
            progress_step: 1,
            sub_items: Vec::new(),
            start,
            end,
            date_scheduled: false,
            time_scheduled: false,
            locked: false,
            autocomplete: false,
            rule: RepeatRule::none(start.date()),
            reminders: Vec::new(),
            categories: Vec::new(),
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            title: task.title.clone(),
            notes: task.notes.clone(),
            icon: task.icon.clone(),
            kind: task.kind,
            progress: task.progress,
            completed_units: task.completed_units,
            progress_step: task.progress_step,
            sub_items: task.sub_items.clone(),
            start: task.start,
            end: task.end,
            date_scheduled: task.date_scheduled,
            time_scheduled: task.time_scheduled,
            locked: task.locked,
            autocomplete: task.autocomplete,
            rule: task.rule.clone(),
            reminders: task.reminders.clone(),
            categories: task.categories.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title cannot be empty".to_string()));
        }
        if self.completed_units <= 0 {
            return Err(Error::Validation(
                "units to complete must be greater than 0".to_string(),
            ));
        }
        if self.kind == TaskKind::Multi && task::fixed_list(&self.sub_items).is_empty() {
            return Err(Error::Validation(
                "a checklist needs at least one item".to_string(),
            ));
        }
        if self.end < self.start {
            return Err(Error::Validation("end is before start".to_string()));
        }
        self.rule.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub id: String,
    pub created: bool,
    pub updated: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub removed: Vec<String>,
}

/// Create or update a task, spreading the edit across its series per `scope`.
pub fn save_task(
    set: &mut WorkingSet,
    draft: &TaskDraft,
    scope: Option<EditScope>,
    now: NaiveDateTime,
) -> Result<Outcome<SaveReport>> {
    draft.validate()?;
    if scope == Some(EditScope::Cancel) {
        return Err(Error::ScopeCancelled);
    }

    let Some(mut target_id) = draft.id.clone() else {
        return Ok(Outcome::Applied(create_task(set, draft, now)));
    };

    let target = set.require(&target_id)?;
    let parent = target.parent.clone().filter(|id| set.contains(id));
    let is_root = target.is_series_root();
    let root_day = target.start_day();
    if parent.is_some() && scope.is_none() {
        return Ok(Outcome::NeedsScope { task_id: target_id });
    }

    let mut rule = draft.rule.clone();
    if let Some(parent_id) = parent.as_deref() {
        rule.exclusions = set.require(parent_id)?.rule.exclusions.clone();
    }

    let mut report = SaveReport {
        id: target_id.clone(),
        ..SaveReport::default()
    };
    let mut targets = vec![target_id.clone()];
    let mut literal = true;

    match (parent.as_deref(), scope) {
        (Some(_), Some(EditScope::This)) | (Some(_), None) => {
            set.unlink(&target_id)?;
        }
        (Some(parent_id), Some(wide)) => {
            let mut members = if wide == EditScope::All {
                set.children_of(parent_id)
                    .into_iter()
                    .map(|task| task.id.clone())
                    .collect()
            } else {
                set.forward_chain(&target_id)
            };

            if rule.repeats() {
                members.push(parent_id.to_string());
            } else {
                members.push(target_id.clone());
                orphan_series(set, parent_id, &members)?;
                report.removed.push(parent_id.to_string());
            }
            targets.extend(members);
        }
        (None, _) if is_root => {
            let children: Vec<String> = set
                .children_of(&target_id)
                .into_iter()
                .map(|task| task.id.clone())
                .collect();
            if rule.repeats() {
                targets.extend(children);
            } else if let Some((heir, heir_day)) = set
                .children_of(&target_id)
                .into_iter()
                .min_by_key(|task| (task.start_day() != root_day, task.start))
                .map(|task| (task.id.clone(), task.start_day()))
            {
                // The occurrence on the root's own day takes the literal edit.
                literal = heir_day == root_day;
                orphan_series(set, &target_id, &children)?;
                report.removed.push(target_id.clone());
                target_id = heir;
                report.id = target_id.clone();
                targets = children;
            }
        }
        (None, _) => {}
    }

    let mut seen = HashSet::new();
    targets.retain(|id| seen.insert(id.clone()));
    for id in &targets {
        if !set.contains(id) {
            continue;
        }
        let is_target = literal && *id == target_id;
        set.update(id, |task| apply_draft(task, draft, &rule, is_target, now))?;
        report.updated.push(id.clone());
    }
    if !literal {
        tracing::debug!(task = %target_id, "series dissolved without an occurrence on the edited day");
        return Ok(Outcome::Applied(report));
    }

    set.update(&target_id, |task| {
        if scope == Some(EditScope::This) {
            task.rule.class = RepeatClass::None;
        }
        if draft.kind != TaskKind::Multi {
            task.progress = draft.progress;
        }
        task.completed_at = if task.is_completed() {
            task.completed_at.or(Some(dates::truncate_to_minute(now)))
        } else {
            None
        };
    })?;

    tracing::debug!(task = %target_id, scope = ?scope, updated = report.updated.len(), "task saved");
    Ok(Outcome::Applied(report))
}

fn create_task(set: &mut WorkingSet, draft: &TaskDraft, now: NaiveDateTime) -> SaveReport {
    let id = task::generate_task_id();
    let mut task = Task::new(id.clone(), draft.title.clone(), draft.start, draft.end, now);
    let mut rule = draft.rule.clone();
    rule.start = task.start_day();
    apply_draft(&mut task, draft, &rule, true, now);
    task.progress = if draft.kind == TaskKind::Multi {
        task.progress
    } else {
        draft.progress
    };
    if task.is_completed() {
        task.completed_at = Some(task.created_at);
    }
    set.insert(task);
    tracing::debug!(task = %id, "task created");
    SaveReport {
        id: id.clone(),
        created: true,
        updated: vec![id],
        removed: Vec::new(),
    }
}

/// Drop a series root; the listed members become standalone records.
fn orphan_series(set: &mut WorkingSet, root_id: &str, members: &[String]) -> Result<()> {
    set.delete(root_id)?;
    for id in members {
        if set.contains(id) {
            set.detach(id)?;
            set.update(id, |task| task.parent = None)?;
        }
    }
    Ok(())
}

fn apply_draft(task: &mut Task, draft: &TaskDraft, rule: &RepeatRule, is_target: bool, now: NaiveDateTime) {
    task.title = draft.title.trim().to_string();
    task.icon = draft.icon.clone();
    task.notes = draft.notes.clone();
    task.completed_units = if draft.kind == TaskKind::Single {
        1
    } else {
        draft.completed_units
    };
    task.progress_step = draft.progress_step.max(1);
    task.locked = draft.locked;

    if task.kind != draft.kind {
        task.progress = 0;
    }
    task.kind = draft.kind;

    let items = task::fixed_list(&draft.sub_items);
    if is_target {
        task.set_start(draft.start);
        task.set_end(draft.end);
        task.set_sub_items(items);
    } else {
        task.set_start(dates::with_time_of(task.start, draft.start));
        task.set_end(dates::with_time_of(task.end, draft.end));
        task.set_sub_items(task::recreated(&items, false));
    }

    task.rule = rule.rewritten();
    task.autocomplete = draft.autocomplete;
    task.reminders = draft.reminders.clone();
    task.categories = draft.categories.clone();
    task.time_scheduled = draft.time_scheduled;
    task.date_scheduled = draft.date_scheduled;
    task.modified_at = now;
}

/// Delete a task, or part of its series per `scope`.
pub fn delete_task(
    set: &mut WorkingSet,
    id: &str,
    scope: Option<EditScope>,
) -> Result<Outcome<DeleteReport>> {
    let target = set.require(id)?;
    if scope == Some(EditScope::Cancel) {
        return Err(Error::ScopeCancelled);
    }

    let parent = target.parent.clone().filter(|parent_id| set.contains(parent_id));
    let is_root = target.is_series_root();
    let day = target.start_day();
    if parent.is_some() && scope.is_none() {
        return Ok(Outcome::NeedsScope {
            task_id: id.to_string(),
        });
    }

    let mut doomed = vec![id.to_string()];
    match (parent.as_deref(), scope) {
        (Some(parent_id), Some(EditScope::This)) | (Some(parent_id), None) => {
            set.update(parent_id, |root| {
                let mut rule = root.rule.rewritten();
                rule.exclude(day);
                root.rule = rule;
            })?;
        }
        (Some(parent_id), Some(EditScope::Future)) => {
            doomed.extend(set.forward_chain(id));
            set.update(parent_id, |root| {
                let mut rule = root.rule.rewritten();
                rule.end = Some(day - Duration::days(1));
                root.rule = rule;
            })?;
        }
        (Some(parent_id), Some(_)) => {
            doomed = set
                .children_of(parent_id)
                .into_iter()
                .map(|task| task.id.clone())
                .collect();
            doomed.push(parent_id.to_string());
        }
        (None, _) if is_root => {
            doomed.extend(set.children_of(id).into_iter().map(|task| task.id.clone()));
        }
        (None, _) => {}
    }

    let mut report = DeleteReport::default();
    for doomed_id in doomed {
        if set.contains(&doomed_id) {
            set.delete(&doomed_id)?;
            report.removed.push(doomed_id);
        }
    }
    tracing::debug!(task = %id, scope = ?scope, removed = report.removed.len(), "task deleted");
    Ok(Outcome::Applied(report))
}

/// Detach an occurrence from its series permanently.
pub fn unlink_task(set: &mut WorkingSet, id: &str) -> Result<()> {
    let task = set.require(id)?;
    if task.parent.is_none() {
        return Err(Error::Validation(format!(
            "task {id} is not part of a repeating series"
        )));
    }
    set.unlink(id)
}

/// Advance a task's progress by one step.
pub fn advance_task(set: &mut WorkingSet, id: &str, now: NaiveDateTime) -> Result<()> {
    set.update(id, |task| task.advance(now))
}
