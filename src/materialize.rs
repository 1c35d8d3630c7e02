//! Lazy occurrence materialization.
//!
//! Series roots are templates; the records a user sees and edits are
//! per-day occurrences cloned from the chain on demand. Materialization only
//! ever adds records and relinks neighbours.

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::dates;
use crate::error::Result;
use crate::store::WorkingSet;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// One occurrence id per series firing on the day.
    pub occurrences: Vec<String>,
    /// The subset of `occurrences` created by this call.
    pub created: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub created: Vec<String>,
    /// Roots whose rule never fires again within the scan window.
    pub exhausted: Vec<String>,
}

/// Roots whose series has an occurrence on `day`.
pub fn firing_roots(set: &WorkingSet, day: NaiveDate) -> Vec<String> {
    let horizon = dates::start_of_next_day(day);
    set.fetch(|task| task.is_series_root() && task.start <= horizon && task.rule.fires_on(day))
        .into_iter()
        .map(|task| task.id.clone())
        .collect()
}

/// Latest chain member starting on or before `day`; the root when none is.
pub fn find_anchor(set: &WorkingSet, root_id: &str, day: NaiveDate) -> String {
    let mut anchor = root_id.to_string();
    for id in set.forward_chain(root_id) {
        match set.get(&id) {
            Some(member) if member.start_day() <= day => anchor = id,
            _ => break,
        }
    }
    anchor
}

/// Make sure every series firing on `day` has exactly one occurrence there.
pub fn resolve_for_date(set: &mut WorkingSet, day: NaiveDate, now: NaiveDateTime) -> Result<Resolution> {
    let mut resolution = Resolution::default();

    for root_id in firing_roots(set, day) {
        let existing: Vec<String> = set
            .children_on(&root_id, day)
            .into_iter()
            .map(|task| task.id.clone())
            .collect();
        if let Some(first) = existing.first() {
            if existing.len() > 1 {
                tracing::warn!(root = %root_id, %day, count = existing.len(), "several occurrences share a day");
            }
            resolution.occurrences.push(first.clone());
            continue;
        }

        let id = dates::occurrence_id(&root_id, day);
        if set.contains(&id) {
            tracing::warn!(root = %root_id, occurrence = %id, "derived id already taken by a detached record");
            continue;
        }

        let anchor = find_anchor(set, &root_id, day);
        let inherit = !set.has_children(&root_id);
        let occurrence = set
            .require(&anchor)?
            .spawn_occurrence(&root_id, day, now, inherit);
        set.insert_after(&anchor, occurrence)?;

        tracing::debug!(root = %root_id, anchor = %anchor, occurrence = %id, "materialized occurrence");
        resolution.occurrences.push(id.clone());
        resolution.created.push(id);
    }

    Ok(resolution)
}

/// Everything scheduled on `day`: series occurrences plus one-off dated tasks.
pub fn day_set(set: &mut WorkingSet, day: NaiveDate, now: NaiveDateTime) -> Result<(Vec<String>, Resolution)> {
    let resolution = resolve_for_date(set, day, now)?;
    let day_start = day.and_time(chrono::NaiveTime::MIN);
    let day_end = dates::start_of_next_day(day);

    let mut ids: Vec<String> = set
        .fetch(|task| {
            task.date_scheduled
                && !task.does_repeat()
                && task.start >= day_start
                && task.start < day_end
                && task.end <= day_end
        })
        .into_iter()
        .map(|task| task.id.clone())
        .collect();
    ids.extend(resolution.occurrences.iter().cloned());
    Ok((ids, resolution))
}

/// Ensure each series has an occurrence at or after `horizon`.
///
/// Roots whose chain already reaches `horizon` are left alone. Otherwise the
/// first firing day within `scan_days` of `horizon` gets an occurrence,
/// cloned from the chain tail and appended to it.
pub fn seed_future(
    set: &mut WorkingSet,
    horizon: NaiveDate,
    now: NaiveDateTime,
    scan_days: u64,
) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let cutoff = dates::start_of_next_day(horizon);
    let roots: Vec<String> = set
        .fetch(|task| task.is_series_root() && task.start <= cutoff)
        .into_iter()
        .map(|task| task.id.clone())
        .collect();

    for root_id in roots {
        let tail = set.chain_tail(&root_id);
        if set.require(&tail)?.start_day() >= horizon {
            continue;
        }

        let rule = set.require(&root_id)?.rule.clone();
        let next_day = (0..=scan_days)
            .map_while(|offset| horizon.checked_add_days(Days::new(offset)))
            .take_while(|day| rule.end.map_or(true, |end| *day <= end))
            .find(|day| rule.fires_on(*day));

        let Some(day) = next_day else {
            tracing::debug!(root = %root_id, "series has no upcoming occurrence");
            set.update(&root_id, |root| root.rule = root.rule.rewritten())?;
            report.exhausted.push(root_id);
            continue;
        };

        let id = dates::occurrence_id(&root_id, day);
        if set.contains(&id) {
            continue;
        }

        let inherit = !set.has_children(&root_id);
        let occurrence = set
            .require(&tail)?
            .spawn_occurrence(&root_id, day, now, inherit);
        set.insert_after(&tail, occurrence)?;
        tracing::debug!(root = %root_id, occurrence = %id, "seeded future occurrence");
        report.created.push(id);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repeat::{parse_weekdays, RepeatRule};
    use crate::task::Task;

    fn dt(raw: &str) -> NaiveDateTime {
        dates::parse_datetime(raw).expect("datetime")
    }

    fn date(raw: &str) -> NaiveDate {
        dates::parse_date(raw).expect("date")
    }

    fn root(id: &str, start: &str, rule: impl FnOnce(NaiveDate) -> RepeatRule) -> Task {
        let start = dt(start);
        let mut task = Task::new(id, "Run", start, start + chrono::Duration::minutes(30), start);
        task.date_scheduled = true;
        task.time_scheduled = true;
        task.rule = rule(start.date());
        task
    }

    #[test]
    fn weekly_occurrence_is_created_once() {
        // 2024-03-04 is a Monday.
        let mut set = WorkingSet::new(
            vec![root("r", "2024-03-04 07:00", |d| {
                RepeatRule::weekly(d, parse_weekdays("mon,wed,fri").expect("mask"))
            })],
            Vec::new(),
        );
        let now = dt("2024-03-06 06:00");

        let first = resolve_for_date(&mut set, date("2024-03-06"), now).expect("resolve");
        assert_eq!(first.occurrences, vec!["r06032024".to_string()]);
        assert_eq!(first.created.len(), 1);
        let occurrence = set.get("r06032024").expect("occurrence");
        assert_eq!(occurrence.start, dt("2024-03-06 07:00"));
        assert_eq!(occurrence.parent.as_deref(), Some("r"));

        let count = set.tasks().len();
        let second = resolve_for_date(&mut set, date("2024-03-06"), now).expect("resolve");
        assert_eq!(second.occurrences, first.occurrences);
        assert!(second.created.is_empty());
        assert_eq!(set.tasks().len(), count);
    }

    #[test]
    fn excluded_day_yields_nothing() {
        let mut task = root("r", "2024-01-01 09:00", |d| RepeatRule::daily(d, 1));
        task.rule.exclude(date("2024-01-03"));
        let mut set = WorkingSet::new(vec![task], Vec::new());

        let excluded = resolve_for_date(&mut set, date("2024-01-03"), dt("2024-01-03 08:00")).expect("resolve");
        assert!(excluded.occurrences.is_empty());

        let next = resolve_for_date(&mut set, date("2024-01-04"), dt("2024-01-04 08:00")).expect("resolve");
        assert_eq!(next.occurrences, vec!["r04012024".to_string()]);
    }

    #[test]
    fn occurrences_are_inserted_in_day_order() {
        let mut set = WorkingSet::new(
            vec![root("r", "2024-01-01 09:00", |d| RepeatRule::daily(d, 1))],
            Vec::new(),
        );
        let now = dt("2024-01-01 08:00");
        resolve_for_date(&mut set, date("2024-01-05"), now).expect("resolve");
        resolve_for_date(&mut set, date("2024-01-02"), now).expect("resolve");
        resolve_for_date(&mut set, date("2024-01-03"), now).expect("resolve");

        assert_eq!(
            set.forward_chain("r"),
            vec![
                "r02012024".to_string(),
                "r03012024".to_string(),
                "r05012024".to_string()
            ]
        );
    }

    #[test]
    fn only_first_occurrence_inherits_progress() {
        let mut task = root("r", "2024-01-01 09:00", |d| RepeatRule::daily(d, 1));
        task.progress = 1;
        let mut set = WorkingSet::new(vec![task], Vec::new());
        let now = dt("2024-01-01 08:00");

        resolve_for_date(&mut set, date("2024-01-01"), now).expect("resolve");
        resolve_for_date(&mut set, date("2024-01-02"), now).expect("resolve");
        assert_eq!(set.get("r01012024").expect("first").progress, 1);
        assert_eq!(set.get("r02012024").expect("second").progress, 0);
    }

    #[test]
    fn broken_chain_falls_back_to_root() {
        let mut task = root("r", "2024-01-01 09:00", |d| RepeatRule::daily(d, 1));
        task.next = Some("missing".to_string());
        let mut set = WorkingSet::new(vec![task], Vec::new());

        let resolution = resolve_for_date(&mut set, date("2024-01-02"), dt("2024-01-02 08:00")).expect("resolve");
        assert_eq!(resolution.created, vec!["r02012024".to_string()]);
        assert_eq!(set.get("r").and_then(|t| t.next.as_deref()), Some("r02012024"));
    }

    #[test]
    fn duplicate_occurrences_are_reused() {
        let mut set = WorkingSet::new(
            vec![root("r", "2024-01-01 09:00", |d| RepeatRule::daily(d, 1))],
            Vec::new(),
        );
        let now = dt("2024-01-01 08:00");
        resolve_for_date(&mut set, date("2024-01-02"), now).expect("resolve");
        let copy = set.get("r02012024").expect("occurrence").clone();
        set.insert(copy);

        let resolution = resolve_for_date(&mut set, date("2024-01-02"), now).expect("resolve");
        assert!(resolution.created.is_empty());
        assert_eq!(resolution.occurrences.len(), 1);
    }

    #[test]
    fn day_set_includes_dated_one_offs() {
        let mut set = WorkingSet::new(
            vec![root("r", "2024-01-01 09:00", |d| RepeatRule::daily(d, 1))],
            Vec::new(),
        );
        let mut dentist = Task::new("d", "Dentist", dt("2024-01-02 14:00"), dt("2024-01-02 15:00"), dt("2024-01-01 08:00"));
        dentist.date_scheduled = true;
        set.insert(dentist);
        let (ids, _) = day_set(&mut set, date("2024-01-02"), dt("2024-01-02 08:00")).expect("day set");
        assert!(ids.contains(&"d".to_string()));
        assert!(ids.contains(&"r02012024".to_string()));
        assert!(!ids.contains(&"r".to_string()));
    }

    #[test]
    fn seed_future_appends_next_firing_day() {
        let mut set = WorkingSet::new(
            vec![root("r", "2024-03-04 07:00", |d| {
                RepeatRule::weekly(d, parse_weekdays("mon,fri").expect("mask"))
            })],
            Vec::new(),
        );
        // Tuesday: the next firing day is Friday the 8th.
        let report = seed_future(&mut set, date("2024-03-05"), dt("2024-03-05 06:00"), 30).expect("seed");
        assert_eq!(report.created, vec!["r08032024".to_string()]);
        assert_eq!(set.chain_tail("r"), "r08032024");

        let again = seed_future(&mut set, date("2024-03-05"), dt("2024-03-05 06:00"), 30).expect("seed");
        assert!(again.created.is_empty());
    }

    #[test]
    fn seed_future_gives_up_on_exhausted_rules() {
        let mut task = root("r", "2024-01-01 07:00", |d| RepeatRule::daily(d, 1));
        task.rule.end = Some(date("2024-01-10"));
        let rule_id = task.rule.id;
        let mut set = WorkingSet::new(vec![task], Vec::new());

        let report = seed_future(&mut set, date("2024-02-01"), dt("2024-02-01 06:00"), 30).expect("seed");
        assert!(report.created.is_empty());
        assert_eq!(report.exhausted, vec!["r".to_string()]);
        assert_ne!(set.get("r").expect("root").rule.id, rule_id);
        assert!(set.is_changed());
    }
}
