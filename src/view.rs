//! Day view assembly, filtering and the widget window.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use chrono::{NaiveDate, NaiveDateTime};
use glob::{MatchOptions, Pattern};
use serde::Serialize;

use crate::dates;
use crate::error::{Error, Result};
use crate::store::WorkingSet;
use crate::task::Task;

/// What a single day looks like to the user.
#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    /// Items without a time of day, by title.
    pub untimed: Vec<Task>,
    /// Time-scheduled items, by end then start.
    pub timeline: Vec<Task>,
}

impl DayView {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            untimed: Vec::new(),
            timeline: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.untimed.len() + self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.untimed.is_empty() && self.timeline.is_empty()
    }

    pub fn timeline_ids(&self) -> Vec<String> {
        self.timeline.iter().map(|task| task.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.untimed
            .iter()
            .chain(self.timeline.iter())
            .find(|task| task.id == id)
    }
}

pub fn untimed_order(a: &Task, b: &Task) -> Ordering {
    a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id))
}

pub fn timeline_order(a: &Task, b: &Task) -> Ordering {
    a.end
        .cmp(&b.end)
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.id.cmp(&b.id))
}

/// Build the view for `date` from its day set.
///
/// Undated tasks show on every day from their creation until they are
/// completed; once completed they only show on the day they were completed.
pub fn assemble(set: &WorkingSet, day_ids: &[String], date: NaiveDate) -> DayView {
    let horizon = dates::start_of_next_day(date);
    let mut seen = HashSet::new();
    let mut view = DayView::empty(date);

    let floating = set.fetch(|task| {
        !task.date_scheduled
            && !task.is_series_root()
            && task.created_at <= horizon
            && match task.completed_at {
                Some(done) if task.is_completed() => done.date() == date,
                _ => !task.is_completed(),
            }
    });
    for task in floating {
        if seen.insert(task.id.clone()) {
            view.untimed.push(task.clone());
        }
    }

    for id in day_ids {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(task) = set.get(id) else {
            tracing::debug!(task = %id, "day set member vanished before assembly");
            continue;
        };
        if task.time_scheduled {
            view.timeline.push(task.clone());
        } else {
            view.untimed.push(task.clone());
        }
    }

    view.untimed.sort_by(untimed_order);
    view.timeline.sort_by(timeline_order);
    view
}

/// Completion and category filter over a [`DayView`].
///
/// Selections combine as a union. Selecting nothing, or both completion
/// states, shows everything.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub show_completed: bool,
    pub show_not_completed: bool,
    categories: Vec<Pattern>,
}

impl ViewFilter {
    pub fn new(show_completed: bool, show_not_completed: bool, categories: &[String]) -> Result<Self> {
        let categories = categories
            .iter()
            .map(|raw| {
                Pattern::new(raw).map_err(|err| {
                    Error::InvalidArgument(format!("invalid category pattern '{raw}': {err}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            show_completed,
            show_not_completed,
            categories,
        })
    }

    pub fn shows_everything(&self) -> bool {
        (self.show_completed && self.show_not_completed)
            || (!self.show_completed && !self.show_not_completed && self.categories.is_empty())
    }

    pub fn matches(&self, set: &WorkingSet, task: &Task, now: NaiveDateTime) -> bool {
        if self.shows_everything() {
            return true;
        }
        let completed = task.is_completed_at(now);
        if (self.show_completed && completed) || (self.show_not_completed && !completed) {
            return true;
        }
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        task.categories
            .iter()
            .filter_map(|id| set.category(*id))
            .any(|category| {
                self.categories
                    .iter()
                    .any(|pattern| pattern.matches_with(&category.title, options))
            })
    }

    /// Narrow a view in place; ordering is preserved.
    pub fn apply(&self, set: &WorkingSet, view: &mut DayView, now: NaiveDateTime) {
        if self.shows_everything() {
            return;
        }
        view.untimed.retain(|task| self.matches(set, task, now));
        view.timeline.retain(|task| self.matches(set, task, now));
    }
}

/// Pick up to `limit` items around `reference` for a compact display.
///
/// Items in progress at `reference` come first. The rest alternate between
/// the nearest upcoming and the most recently finished, starting with
/// upcoming; an exhausted side is skipped. The result is in timeline order.
pub fn window_items(items: &[Task], limit: usize, reference: NaiveDateTime) -> Vec<Task> {
    let mut current: Vec<&Task> = Vec::new();
    let mut past: Vec<&Task> = Vec::new();
    let mut upcoming: Vec<&Task> = Vec::new();
    for task in items {
        if task.end < reference {
            past.push(task);
        } else if task.start > reference {
            upcoming.push(task);
        } else {
            current.push(task);
        }
    }
    current.sort_by(|a, b| timeline_order(a, b));
    past.sort_by(|a, b| timeline_order(a, b));
    upcoming.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| timeline_order(a, b)));
    let mut upcoming: VecDeque<&Task> = upcoming.into();

    let mut picked: Vec<&Task> = current.into_iter().take(limit).collect();
    let mut from_upcoming = true;
    while picked.len() < limit && (!past.is_empty() || !upcoming.is_empty()) {
        let next = if from_upcoming {
            upcoming.pop_front().or_else(|| past.pop())
        } else {
            past.pop().or_else(|| upcoming.pop_front())
        };
        if let Some(task) = next {
            picked.push(task);
        }
        from_upcoming = !from_upcoming;
    }

    let mut window: Vec<Task> = picked.into_iter().cloned().collect();
    window.sort_by(timeline_order);
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::day_set;
    use crate::repeat::RepeatRule;
    use crate::task::Category;

    fn dt(raw: &str) -> NaiveDateTime {
        dates::parse_datetime(raw).expect("datetime")
    }

    fn day(raw: &str) -> NaiveDate {
        dates::parse_date(raw).expect("date")
    }

    fn timed(id: &str, start: &str, end: &str) -> Task {
        let mut task = Task::new(id, id, dt(start), dt(end), dt("2024-01-01 00:00"));
        task.date_scheduled = true;
        task.time_scheduled = true;
        task
    }

    fn floating(id: &str, title: &str, created: &str) -> Task {
        Task::new(id, title, dt(created), dt(created), dt(created))
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    #[test]
    fn floating_tasks_follow_creation_and_completion() {
        let mut done_yesterday = floating("f1", "Read", "2024-01-01 08:00");
        done_yesterday.advance(dt("2024-01-01 12:00"));
        let mut done_today = floating("f2", "Call", "2024-01-01 08:00");
        done_today.advance(dt("2024-01-02 09:00"));
        let open = floating("f3", "Bank", "2024-01-01 08:00");
        let future = floating("f4", "Later", "2024-01-05 08:00");
        let set = WorkingSet::new(vec![done_yesterday, done_today, open, future], Vec::new());

        let view = assemble(&set, &[], day("2024-01-02"));
        assert_eq!(ids(&view.untimed), vec!["f3", "f2"]);
        assert!(view.timeline.is_empty());
    }

    #[test]
    fn untimed_titles_sort_case_sensitively() {
        let set = WorkingSet::new(
            vec![
                floating("a", "apple", "2024-01-01 08:00"),
                floating("b", "Banana", "2024-01-01 08:00"),
                floating("c", "Banana", "2024-01-01 07:00"),
            ],
            Vec::new(),
        );
        let view = assemble(&set, &[], day("2024-01-01"));
        assert_eq!(ids(&view.untimed), vec!["b", "c", "a"]);
    }

    #[test]
    fn floating_task_created_at_next_midnight_shows() {
        let set = WorkingSet::new(
            vec![
                floating("edge", "Edge", "2024-01-02 00:00"),
                floating("late", "Late", "2024-01-02 00:01"),
            ],
            Vec::new(),
        );
        let view = assemble(&set, &[], day("2024-01-01"));
        assert_eq!(ids(&view.untimed), vec!["edge"]);
    }

    #[test]
    fn day_set_splits_into_untimed_and_timeline() {
        let mut root = timed("r", "2024-01-01 09:00", "2024-01-01 09:30");
        root.rule = RepeatRule::daily(day("2024-01-01"), 1);
        let mut dated = Task::new("d", "Dentist", dt("2024-01-02 00:00"), dt("2024-01-02 00:00"), dt("2024-01-01 00:00"));
        dated.date_scheduled = true;
        let early = timed("e", "2024-01-02 07:00", "2024-01-02 08:00");
        let mut set = WorkingSet::new(vec![root, dated, early], Vec::new());

        let (day_ids, _) = day_set(&mut set, day("2024-01-02"), dt("2024-01-02 06:00")).expect("day set");
        let view = assemble(&set, &day_ids, day("2024-01-02"));
        assert_eq!(ids(&view.untimed), vec!["d"]);
        assert_eq!(ids(&view.timeline), vec!["e", "r02012024"]);
    }

    #[test]
    fn timeline_sorts_by_end_then_start() {
        let set = WorkingSet::new(
            vec![
                timed("long", "2024-01-01 08:00", "2024-01-01 10:00"),
                timed("short", "2024-01-01 09:00", "2024-01-01 10:00"),
                timed("first", "2024-01-01 07:00", "2024-01-01 07:30"),
            ],
            Vec::new(),
        );
        let day_ids: Vec<String> = ["short", "long", "first"].iter().map(|s| s.to_string()).collect();
        let view = assemble(&set, &day_ids, day("2024-01-01"));
        assert_eq!(ids(&view.timeline), vec!["first", "long", "short"]);
    }

    #[test]
    fn filter_unions_completion_and_categories() {
        let work = Category::new("Work");
        let mut a = timed("a", "2024-01-01 08:00", "2024-01-01 09:00");
        a.categories.push(work.id);
        let mut b = timed("b", "2024-01-01 09:00", "2024-01-01 10:00");
        b.advance(dt("2024-01-01 10:00"));
        let c = timed("c", "2024-01-01 10:00", "2024-01-01 11:00");
        let set = WorkingSet::new(vec![a, b, c], vec![work]);
        let day_ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let now = dt("2024-01-01 07:00");

        let mut view = assemble(&set, &day_ids, day("2024-01-01"));
        ViewFilter::new(true, false, &["w*".to_string()])
            .expect("filter")
            .apply(&set, &mut view, now);
        assert_eq!(ids(&view.timeline), vec!["a", "b"]);

        let mut view = assemble(&set, &day_ids, day("2024-01-01"));
        ViewFilter::new(true, true, &[]).expect("filter").apply(&set, &mut view, now);
        assert_eq!(view.timeline.len(), 3);
    }

    #[test]
    fn bad_category_pattern_is_rejected() {
        assert!(ViewFilter::new(false, false, &["[".to_string()]).is_err());
    }

    fn hourly() -> Vec<Task> {
        (8..16)
            .map(|hour| {
                timed(
                    &format!("h{hour}"),
                    &format!("2024-01-01 {hour:02}:00"),
                    &format!("2024-01-01 {hour:02}:45"),
                )
            })
            .collect()
    }

    #[test]
    fn window_prefers_current_then_alternates() {
        let items = hourly();
        let window = window_items(&items, 3, dt("2024-01-01 11:10"));
        assert_eq!(ids(&window), vec!["h10", "h11", "h12"]);

        let window = window_items(&items, 4, dt("2024-01-01 11:50"));
        assert_eq!(ids(&window), vec!["h10", "h11", "h12", "h13"]);
    }

    #[test]
    fn window_is_bounded_and_sorted() {
        let items = hourly();
        for limit in 0..10 {
            let window = window_items(&items, limit, dt("2024-01-01 12:20"));
            assert_eq!(window.len(), limit.min(items.len()));
            assert!(window.windows(2).all(|pair| timeline_order(&pair[0], &pair[1]) != Ordering::Greater));
        }
    }

    #[test]
    fn window_skips_exhausted_side() {
        let items = hourly();
        let window = window_items(&items, 3, dt("2024-01-01 23:00"));
        assert_eq!(ids(&window), vec!["h13", "h14", "h15"]);
        let window = window_items(&items, 2, dt("2024-01-01 06:00"));
        assert_eq!(ids(&window), vec!["h8", "h9"]);
    }
}
