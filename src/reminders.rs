//! Reminder planning and the scheduler seam.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::dates;
use crate::store::WorkingSet;
use crate::task::Task;
use crate::timedelta::Timedelta;

/// Whatever actually delivers reminders.
pub trait ReminderScheduler: Send {
    /// Forget every reminder scheduled so far.
    fn clear_all(&mut self);
    /// Schedule one reminder per offset for `task`.
    fn schedule(&mut self, task: &Task, offsets: &[Timedelta]);
    /// Drop the reminders of a single task.
    fn cancel(&mut self, task_id: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub task_id: String,
    pub title: String,
    pub offset: Timedelta,
    pub fire_at: NaiveDateTime,
}

/// Untimed tasks are reminded relative to the start of their day.
pub fn fire_time(task: &Task, offset: Timedelta) -> NaiveDateTime {
    let base = if task.time_scheduled {
        task.start
    } else {
        dates::start_of_day(task.start)
    };
    base - offset.as_duration()
}

/// The task's offsets without duplicates or fire times already behind `now`.
pub fn pending_offsets(task: &Task, now: NaiveDateTime) -> Vec<Timedelta> {
    let mut offsets: Vec<Timedelta> = Vec::new();
    for offset in &task.reminders {
        if offsets.contains(offset) || fire_time(task, *offset) < now {
            continue;
        }
        offsets.push(*offset);
    }
    offsets
}

/// Rebuild every reminder from the working set.
///
/// Series roots are templates and are never reminded about; their
/// occurrences are.
pub fn sync_reminders(
    set: &WorkingSet,
    scheduler: &mut dyn ReminderScheduler,
    now: NaiveDateTime,
) -> Vec<Reminder> {
    scheduler.clear_all();
    let mut planned = Vec::new();
    for task in set.fetch(|task| !task.reminders.is_empty() && !task.is_series_root() && task.start >= now) {
        let offsets = pending_offsets(task, now);
        if offsets.is_empty() {
            continue;
        }
        scheduler.schedule(task, &offsets);
        planned.extend(offsets.iter().map(|offset| Reminder {
            task_id: task.id.clone(),
            title: task.title.clone(),
            offset: *offset,
            fire_at: fire_time(task, *offset),
        }));
    }
    tracing::debug!(reminders = planned.len(), "reminders synced");
    planned
}

/// Scheduler that only records what it was asked to do.
///
/// The command line uses it to report reminders; nothing is delivered.
#[derive(Debug, Clone, Default)]
pub struct ReminderLog {
    pub scheduled: Vec<Reminder>,
    pub cancelled: Vec<String>,
    pub clears: usize,
}

impl ReminderLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReminderScheduler for ReminderLog {
    fn clear_all(&mut self) {
        self.scheduled.clear();
        self.clears += 1;
    }

    fn schedule(&mut self, task: &Task, offsets: &[Timedelta]) {
        self.scheduled.retain(|reminder| reminder.task_id != task.id);
        self.scheduled.extend(offsets.iter().map(|offset| Reminder {
            task_id: task.id.clone(),
            title: task.title.clone(),
            offset: *offset,
            fire_at: fire_time(task, *offset),
        }));
    }

    fn cancel(&mut self, task_id: &str) {
        self.scheduled.retain(|reminder| reminder.task_id != task_id);
        self.cancelled.push(task_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repeat::RepeatRule;

    fn dt(raw: &str) -> NaiveDateTime {
        dates::parse_datetime(raw).expect("datetime")
    }

    fn reminded(id: &str, start: &str, offsets: &[i64]) -> Task {
        let mut task = Task::new(id, id, dt(start), dt(start), dt("2024-01-01 00:00"));
        task.date_scheduled = true;
        task.time_scheduled = true;
        task.reminders = offsets.iter().map(|m| Timedelta::from_minutes(*m)).collect();
        task
    }

    #[test]
    fn untimed_tasks_fire_relative_to_midnight() {
        let mut task = reminded("t", "2024-01-02 15:00", &[60]);
        assert_eq!(fire_time(&task, Timedelta::from_minutes(60)), dt("2024-01-02 14:00"));
        task.time_scheduled = false;
        assert_eq!(fire_time(&task, Timedelta::from_minutes(60)), dt("2024-01-01 23:00"));
    }

    #[test]
    fn duplicate_and_past_offsets_are_dropped() {
        let task = reminded("t", "2024-01-01 10:00", &[15, 15, 120, 5]);
        let offsets = pending_offsets(&task, dt("2024-01-01 09:00"));
        assert_eq!(offsets, vec![Timedelta::from_minutes(15), Timedelta::from_minutes(5)]);
    }

    #[test]
    fn sync_clears_then_schedules_future_tasks() {
        let mut root = reminded("r", "2024-01-03 08:00", &[10]);
        root.rule = RepeatRule::daily(root.start_day(), 1);
        let set = WorkingSet::new(
            vec![
                reminded("past", "2024-01-01 07:00", &[10]),
                reminded("soon", "2024-01-01 12:00", &[10, 30]),
                root,
            ],
            Vec::new(),
        );
        let mut log = ReminderLog::new();
        log.schedule(&reminded("stale", "2024-02-01 09:00", &[5]), &[Timedelta::from_minutes(5)]);

        let planned = sync_reminders(&set, &mut log, dt("2024-01-01 09:00"));
        assert_eq!(log.clears, 1);
        assert_eq!(planned.len(), 2);
        assert!(planned.iter().all(|reminder| reminder.task_id == "soon"));
        assert_eq!(log.scheduled, planned);
    }

    #[test]
    fn cancel_forgets_one_task() {
        let mut log = ReminderLog::new();
        log.schedule(&reminded("a", "2024-01-01 12:00", &[5]), &[Timedelta::from_minutes(5)]);
        log.schedule(&reminded("b", "2024-01-01 13:00", &[5]), &[Timedelta::from_minutes(5)]);
        log.cancel("a");
        assert_eq!(log.scheduled.len(), 1);
        assert_eq!(log.cancelled, vec!["a".to_string()]);
    }
}
