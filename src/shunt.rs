//! Pushing a run of timeline items later or earlier in the day.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::dates;
use crate::error::{Error, Result};
use crate::store::WorkingSet;
use crate::timedelta::Timedelta;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShuntReport {
    pub moved: Vec<String>,
    /// Items that no longer fit the day and were pushed to the next one.
    pub unscheduled: Vec<String>,
    pub skipped_locked: Vec<String>,
}

/// Move `start_id` and every timeline item after it by `delta`.
///
/// Only the hour and minute part of `delta` is used; its sign picks the
/// direction. Locked items after the first stay put. An item that would run
/// into a locked neighbour (going forward), into the previous item (going
/// back), or past the end of `day`, is unscheduled onto the next day instead.
/// Every shunted item leaves its series.
pub fn shunt(
    set: &mut WorkingSet,
    timeline: &[String],
    start_id: &str,
    delta: Timedelta,
    day: NaiveDate,
    now: NaiveDateTime,
) -> Result<ShuntReport> {
    let index = timeline
        .iter()
        .position(|id| id == start_id)
        .ok_or_else(|| Error::InvalidArgument(format!("task {start_id} is not on the timeline")))?;

    let magnitude = delta.abs();
    let minutes = magnitude.hours() * 60 + magnitude.minutes();
    let forward = !delta.is_negative();
    let step = Duration::minutes(if forward { minutes } else { -minutes });

    let before = index.checked_sub(1).map(|i| timeline[i].clone());
    let run = &timeline[index..];
    let next_day = dates::start_of_next_day(day);
    let mut report = ShuntReport::default();

    for (i, id) in run.iter().enumerate() {
        let (locked, start, end, in_series) = {
            let task = set.require(id)?;
            (task.locked, task.start, task.end, task.parent.is_some())
        };
        if i != 0 && locked {
            report.skipped_locked.push(id.clone());
            continue;
        }

        let new_start = start + step;
        let new_end = end + step;

        let mut bumped = if forward {
            match run.get(i + 1) {
                Some(next_id) => {
                    let next = set.require(next_id)?;
                    next.locked && new_end > next.start
                }
                None => false,
            }
        } else {
            let prev_id = if i > 0 { Some(&run[i - 1]) } else { before.as_ref() };
            match prev_id {
                Some(prev_id) => new_start < set.require(prev_id)?.end,
                None => false,
            }
        };
        if new_end.date() != day {
            bumped = true;
        }

        if in_series {
            set.unlink(id)?;
        }

        set.update(id, |task| {
            if bumped {
                task.reminders.clear();
                task.set_start(next_day);
                task.set_end(next_day);
                task.time_scheduled = false;
            } else {
                task.set_start(new_start);
                task.set_end(new_end);
            }
            task.modified_at = now;
        })?;

        if bumped {
            report.unscheduled.push(id.clone());
        } else {
            report.moved.push(id.clone());
        }
    }

    tracing::debug!(
        start = %start_id,
        moved = report.moved.len(),
        unscheduled = report.unscheduled.len(),
        "shunted timeline"
    );
    Ok(report)
}
