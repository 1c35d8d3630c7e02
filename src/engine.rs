//! The planner: store, reconciliation passes and user operations.
//!
//! Every entry point ends in the same pass: materialize the day, rebuild
//! reminders, clean up, assemble the view, persist. Only the first steps
//! differ by trigger.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

use crate::cleanup::{self, CleanupReport};
use crate::config::Config;
use crate::edit::{self, DeleteReport, EditScope, Outcome, SaveReport, TaskDraft};
use crate::error::{Error, Result};
use crate::events::{Event, EventKind};
use crate::lock::FileLock;
use crate::materialize::{self, SeedReport};
use crate::reminders::{self, Reminder, ReminderScheduler};
use crate::shunt::{self, ShuntReport};
use crate::store::{Store, WorkingSet};
use crate::task::{Category, Task};
use crate::timedelta::Timedelta;
use crate::view::{self, DayView};

/// Why a reconciliation pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The calendar day rolled over, or the planner just started.
    DateChanged,
    /// Another writer changed the store.
    ExternalSync,
    /// Periodic wake-up while idle.
    BackgroundWake,
    /// The user changed something.
    UserSave,
}

impl Trigger {
    pub fn kind(self) -> PassKind {
        match self {
            Trigger::DateChanged | Trigger::BackgroundWake => PassKind {
                reload: false,
                full_reset: true,
            },
            Trigger::ExternalSync => PassKind {
                reload: true,
                full_reset: false,
            },
            Trigger::UserSave => PassKind::default(),
        }
    }
}

/// What a pass does beyond the common steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassKind {
    /// Re-read the store before reconciling.
    pub reload: bool,
    /// Seed future occurrences and collect empty categories.
    pub full_reset: bool,
}

impl PassKind {
    /// Combine two queued passes into one that does the work of both.
    pub fn merge(self, other: PassKind) -> PassKind {
        PassKind {
            reload: self.reload || other.reload,
            full_reset: self.full_reset || other.full_reset,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub date: NaiveDate,
    pub kind: PassKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeded: Option<SeedReport>,
    /// Occurrences created by seeding or for `date`.
    pub materialized: Vec<String>,
    pub reminders: Vec<Reminder>,
    pub cleanup: CleanupReport,
    /// Whether anything was written.
    pub saved: bool,
    #[serde(skip)]
    pub view: DayView,
}

impl PassReport {
    pub fn summary(&self) -> PassSummary {
        let cleanup = &self.cleanup;
        PassSummary {
            date: self.date,
            kind: self.kind,
            materialized: self.materialized.len(),
            reminders: self.reminders.len(),
            cleaned: cleanup.duplicates_removed.len()
                + cleanup.orphans_pruned.len()
                + cleanup.detached.len()
                + cleanup.categories_removed.len(),
            saved: self.saved,
        }
    }
}

/// Counts from a pass, carried in command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub date: NaiveDate,
    pub kind: PassKind,
    pub materialized: usize,
    pub reminders: usize,
    pub cleaned: usize,
    pub saved: bool,
}

pub struct Planner {
    store: Store,
    config: Config,
    scheduler: Box<dyn ReminderScheduler>,
    lock: Option<(PathBuf, u64)>,
    events: Vec<Event>,
    last_pass: Option<PassSummary>,
}

impl Planner {
    pub fn new(store: Store, config: Config, scheduler: Box<dyn ReminderScheduler>) -> Self {
        Self {
            store,
            config,
            scheduler,
            lock: None,
            events: Vec::new(),
            last_pass: None,
        }
    }

    /// Hold `path` during each pass and re-read the store under it.
    ///
    /// For long-running planners sharing a directory with other processes.
    pub fn with_lock(mut self, path: impl Into<PathBuf>, timeout_ms: u64) -> Self {
        self.lock = Some((path.into(), timeout_ms));
        self
    }

    pub fn working(&self) -> &WorkingSet {
        self.store.working()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The most recent pass this planner ran, if any.
    pub fn last_pass(&self) -> Option<PassSummary> {
        self.last_pass
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn record<T: Serialize>(&mut self, kind: EventKind, data: T) -> Result<()> {
        self.events.push(Event::new(kind).with_data(data)?);
        Ok(())
    }

    fn guard(&self) -> Result<Option<FileLock>> {
        match &self.lock {
            Some((path, timeout_ms)) => FileLock::acquire(path, *timeout_ms).map(Some),
            None => Ok(None),
        }
    }

    /// Run one reconciliation pass for the day containing `now`.
    ///
    /// A failed commit leaves the working set dirty; the next pass writes it.
    pub fn run_pass(&mut self, kind: PassKind, now: NaiveDateTime) -> Result<PassReport> {
        let _guard = self.guard()?;
        if kind.reload || self.lock.is_some() {
            self.store.reload()?;
        }

        let today = now.date();
        let scan_days = self.config.refresh.seed_scan_days;
        let clean_categories = kind.full_reset && self.config.refresh.clean_categories;

        let set = self.store.working_mut();
        let seeded = if kind.full_reset {
            Some(materialize::seed_future(set, today, now, scan_days)?)
        } else {
            None
        };
        let (day_ids, resolution) = materialize::day_set(set, today, now)?;
        let planned = reminders::sync_reminders(set, self.scheduler.as_mut(), now);
        let cleaned = cleanup::cleanup(set, clean_categories)?;
        let view = view::assemble(set, &day_ids, today);
        let saved = self.store.save()?;

        let mut materialized = seeded
            .as_ref()
            .map(|seed| seed.created.clone())
            .unwrap_or_default();
        for id in resolution.created {
            if !materialized.contains(&id) {
                materialized.push(id);
            }
        }

        let report = PassReport {
            date: today,
            kind,
            seeded,
            materialized,
            reminders: planned,
            cleanup: cleaned,
            saved,
            view,
        };
        self.record_pass(&report)?;
        self.last_pass = Some(report.summary());
        tracing::info!(
            date = %today,
            full_reset = kind.full_reset,
            reload = kind.reload,
            materialized = report.materialized.len(),
            saved,
            "reconciliation pass finished"
        );
        Ok(report)
    }

    fn record_pass(&mut self, report: &PassReport) -> Result<()> {
        for id in &report.materialized {
            self.record(EventKind::OccurrenceMaterialized, serde_json::json!({ "id": id }))?;
        }
        for reminder in &report.reminders {
            self.record(EventKind::ReminderScheduled, reminder)?;
        }
        if !report.cleanup.is_empty() {
            self.record(EventKind::CleanupCompleted, &report.cleanup)?;
        }
        self.record(
            EventKind::PassCompleted,
            serde_json::json!({
                "date": report.date,
                "kind": report.kind,
                "saved": report.saved,
            }),
        )
    }

    pub fn reset(&mut self, now: NaiveDateTime) -> Result<PassReport> {
        self.run_pass(Trigger::DateChanged.kind(), now)
    }

    pub fn sync(&mut self, now: NaiveDateTime) -> Result<PassReport> {
        self.run_pass(Trigger::ExternalSync.kind(), now)
    }

    /// View for any day, materializing its occurrences.
    pub fn refresh(&mut self, date: NaiveDate, now: NaiveDateTime) -> Result<DayView> {
        let set = self.store.working_mut();
        let (day_ids, resolution) = materialize::day_set(set, date, now)?;
        let view = view::assemble(set, &day_ids, date);
        self.store.save()?;
        for id in &resolution.created {
            self.record(EventKind::OccurrenceMaterialized, serde_json::json!({ "id": id }))?;
        }
        Ok(view)
    }

    /// Up to `limit` timeline items around `now`.
    pub fn widget(&mut self, limit: usize, now: NaiveDateTime) -> Result<Vec<Task>> {
        let view = self.refresh(now.date(), now)?;
        Ok(view::window_items(&view.timeline, limit, now))
    }

    pub fn save_task(
        &mut self,
        draft: &TaskDraft,
        scope: Option<EditScope>,
        now: NaiveDateTime,
    ) -> Result<Outcome<SaveReport>> {
        let outcome = edit::save_task(self.store.working_mut(), draft, scope, now)?;
        if let Outcome::Applied(report) = &outcome {
            for id in &report.removed {
                self.scheduler.cancel(id);
                self.record(EventKind::ReminderCancelled, serde_json::json!({ "task_id": id }))?;
            }
            let kind = if report.created {
                EventKind::TaskCreated
            } else {
                EventKind::TaskSaved
            };
            self.record(kind, report)?;
            self.run_pass(Trigger::UserSave.kind(), now)?;
        }
        Ok(outcome)
    }

    pub fn delete_task(
        &mut self,
        id: &str,
        scope: Option<EditScope>,
        now: NaiveDateTime,
    ) -> Result<Outcome<DeleteReport>> {
        let outcome = edit::delete_task(self.store.working_mut(), id, scope)?;
        if let Outcome::Applied(report) = &outcome {
            for removed in &report.removed {
                self.scheduler.cancel(removed);
                self.record(EventKind::ReminderCancelled, serde_json::json!({ "task_id": removed }))?;
            }
            self.record(EventKind::TaskDeleted, report)?;
            self.run_pass(Trigger::UserSave.kind(), now)?;
        }
        Ok(outcome)
    }

    pub fn unlink_task(&mut self, id: &str, now: NaiveDateTime) -> Result<Task> {
        edit::unlink_task(self.store.working_mut(), id)?;
        self.record(EventKind::TaskUnlinked, serde_json::json!({ "id": id }))?;
        self.run_pass(Trigger::UserSave.kind(), now)?;
        Ok(self.store.working().require(id)?.clone())
    }

    pub fn advance_task(&mut self, id: &str, now: NaiveDateTime) -> Result<Task> {
        edit::advance_task(self.store.working_mut(), id, now)?;
        let task = self.store.working().require(id)?.clone();
        self.record(
            EventKind::TaskProgressed,
            serde_json::json!({
                "id": id,
                "progress": task.progress,
                "completed_units": task.completed_units,
                "completed": task.is_completed(),
            }),
        )?;
        self.run_pass(Trigger::UserSave.kind(), now)?;
        Ok(task)
    }

    /// Shunt `id` and the rest of its day's timeline by `delta`.
    pub fn shunt(&mut self, id: &str, delta: Timedelta, now: NaiveDateTime) -> Result<ShuntReport> {
        let day = self.store.working().require(id)?.start_day();
        let set = self.store.working_mut();
        let (day_ids, _) = materialize::day_set(set, day, now)?;
        let timeline = view::assemble(set, &day_ids, day).timeline_ids();
        let report = shunt::shunt(set, &timeline, id, delta, day, now)?;
        self.record(EventKind::TaskShunted, &report)?;
        self.run_pass(Trigger::UserSave.kind(), now)?;
        Ok(report)
    }

    /// Id of the category titled `title`, creating it when missing.
    pub fn ensure_category(&mut self, title: &str) -> Result<Uuid> {
        if let Some(existing) = self.store.working().category_by_title(title) {
            return Ok(existing.id);
        }
        Ok(self.add_category(title)?.id)
    }

    pub fn add_category(&mut self, title: &str) -> Result<Category> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Validation("category title cannot be empty".to_string()));
        }
        if self.store.working().category_by_title(title).is_some() {
            return Err(Error::Validation(format!("category '{title}' already exists")));
        }
        let category = Category::new(title);
        self.store.working_mut().add_category(category.clone());
        self.record(EventKind::CategoryCreated, &category)?;
        Ok(category)
    }

    /// Remove a category by id or title; tasks lose the reference.
    pub fn remove_category(&mut self, key: &str) -> Result<Category> {
        let id = self
            .store
            .working()
            .categories()
            .iter()
            .find(|category| category.id.to_string() == key || category.title.eq_ignore_ascii_case(key))
            .map(|category| category.id)
            .ok_or_else(|| Error::CategoryNotFound(key.to_string()))?;
        let removed = self.store.working_mut().remove_category(id)?;
        self.record(EventKind::CategoryRemoved, &removed)?;
        Ok(removed)
    }

    /// Persist pending changes outside a pass.
    pub fn save(&mut self) -> Result<bool> {
        self.store.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates;
    use crate::reminders::ReminderLog;
    use crate::repeat::RepeatRule;
    use crate::store::MemoryBackend;
    use chrono::Duration;

    fn dt(raw: &str) -> NaiveDateTime {
        dates::parse_datetime(raw).expect("datetime")
    }

    fn planner(backend: &MemoryBackend) -> Planner {
        let store = Store::open(Box::new(backend.clone())).expect("open");
        Planner::new(store, Config::default(), Box::new(ReminderLog::new()))
    }

    fn weekly_standup() -> Task {
        let start = dt("2024-01-01 09:00");
        let mut root = Task::new("standup", "Standup", start, start + Duration::minutes(15), start);
        root.date_scheduled = true;
        root.time_scheduled = true;
        root.reminders = vec![Timedelta::from_minutes(5)];
        root.rule = RepeatRule::weekly(start.date(), 0b0000_0001);
        root
    }

    #[test]
    fn reset_seeds_and_persists() {
        let backend = MemoryBackend::with_tasks(vec![weekly_standup()]);
        let mut planner = planner(&backend);

        let report = planner.reset(dt("2024-01-08 08:00")).expect("reset");
        assert!(report.saved);
        assert_eq!(report.materialized, vec!["standup08012024".to_string()]);
        assert_eq!(report.view.timeline.len(), 1);
        assert_eq!(report.reminders.len(), 1);
        assert_eq!(report.reminders[0].fire_at, dt("2024-01-08 08:55"));
        assert!(backend.tasks().iter().any(|task| task.id == "standup08012024"));

        let again = planner.reset(dt("2024-01-08 08:30")).expect("reset");
        assert!(again.materialized.is_empty());
        assert!(!again.saved);
        let last = planner.last_pass().expect("last pass");
        assert_eq!(last, again.summary());
        assert_eq!((last.materialized, last.reminders, last.saved), (0, 1, false));
    }

    #[test]
    fn failed_commit_is_retried_by_next_pass() {
        let backend = MemoryBackend::with_tasks(vec![weekly_standup()]);
        let mut planner = planner(&backend);
        backend.set_fail_commits(true);
        assert!(planner.reset(dt("2024-01-08 08:00")).is_err());
        assert!(planner.working().is_changed());

        backend.set_fail_commits(false);
        let report = planner.run_pass(Trigger::UserSave.kind(), dt("2024-01-08 08:01")).expect("retry");
        assert!(report.saved);
        assert!(backend.tasks().iter().any(|task| task.id == "standup08012024"));
    }

    #[test]
    fn series_edit_without_scope_is_reported() {
        let backend = MemoryBackend::with_tasks(vec![weekly_standup()]);
        let mut planner = planner(&backend);
        planner.reset(dt("2024-01-08 08:00")).expect("reset");

        let occurrence = planner.working().require("standup08012024").expect("occurrence").clone();
        let mut draft = TaskDraft::from_task(&occurrence);
        draft.title = "Sync".to_string();
        let outcome = planner.save_task(&draft, None, dt("2024-01-08 08:10")).expect("save");
        assert_eq!(
            outcome,
            Outcome::NeedsScope {
                task_id: "standup08012024".to_string()
            }
        );
        planner.drain_events();

        planner
            .save_task(&draft, Some(EditScope::This), dt("2024-01-08 08:10"))
            .expect("save")
            .require_applied()
            .expect("applied");
        let events = planner.drain_events();
        assert_eq!(events[0].event, EventKind::TaskSaved);
        assert_eq!(events.last().map(|event| event.event), Some(EventKind::PassCompleted));
    }

    #[test]
    fn delete_cancels_reminders() {
        let backend = MemoryBackend::with_tasks(vec![weekly_standup()]);
        let mut planner = planner(&backend);
        planner.reset(dt("2024-01-08 08:00")).expect("reset");
        planner.drain_events();

        planner
            .delete_task("standup08012024", Some(EditScope::This), dt("2024-01-08 08:05"))
            .expect("delete");
        let events = planner.drain_events();
        assert!(events.iter().any(|event| event.event == EventKind::ReminderCancelled));
        assert!(planner.working().get("standup08012024").is_none());
        assert!(planner
            .working()
            .require("standup")
            .expect("root")
            .rule
            .is_excluded(dates::parse_date("2024-01-08").expect("date")));
    }

    #[test]
    fn categories_are_unique_by_title() {
        let backend = MemoryBackend::new();
        let mut planner = planner(&backend);
        let work = planner.add_category("Work").expect("add");
        assert_eq!(planner.ensure_category("work").expect("ensure"), work.id);
        assert!(planner.add_category("Work").is_err());
        assert!(planner.add_category("  ").is_err());

        planner.remove_category("WORK").expect("remove");
        assert!(matches!(planner.remove_category("Work"), Err(Error::CategoryNotFound(_))));
    }

    #[test]
    fn trigger_kinds_merge() {
        let merged = Trigger::UserSave
            .kind()
            .merge(Trigger::ExternalSync.kind())
            .merge(Trigger::DateChanged.kind());
        assert!(merged.reload && merged.full_reset);
        assert_eq!(Trigger::UserSave.kind(), PassKind::default());
    }
}
