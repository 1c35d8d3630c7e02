//! Task commands: add, edit, rm, progress, unlink, shunt.
//!
//! Each command opens the planner under the store lock, applies one
//! operation (which ends in a reconciliation pass), then reports.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::cli::context::{Context, Globals};
use crate::cli::TaskArgs;
use crate::config::Config;
use crate::dates;
use crate::edit::{DeleteReport, EditScope, SaveReport, TaskDraft};
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};
use crate::repeat::{self, RepeatClass, RepeatRule};
use crate::shunt::ShuntReport;
use crate::task::{SubItem, Task, TaskKind};
use crate::timedelta::Timedelta;

pub struct AddOptions {
    pub title: String,
    pub fields: TaskArgs,
    pub globals: Globals,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub scope: Option<String>,
    pub fields: TaskArgs,
    pub globals: Globals,
}

pub struct RmOptions {
    pub id: String,
    pub scope: Option<String>,
    pub globals: Globals,
}

pub struct IdOptions {
    pub id: String,
    pub globals: Globals,
}

pub struct ShuntOptions {
    pub id: String,
    pub by: String,
    pub back: bool,
    pub globals: Globals,
}

#[derive(Serialize)]
struct SaveOutput {
    task: Task,
    #[serde(flatten)]
    report: SaveReport,
}

#[derive(Serialize)]
struct DeleteOutput {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<EditScope>,
    #[serde(flatten)]
    report: DeleteReport,
}

#[derive(Serialize)]
struct TaskOutput {
    task: Task,
}

#[derive(Serialize)]
struct ShuntOutput {
    id: String,
    delta: Timedelta,
    #[serde(flatten)]
    report: ShuntReport,
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let mut ctx = Context::load(&options.globals)?;
    let now = ctx.now;

    let config = ctx.planner.config().clone();
    let mut draft = TaskDraft::new(options.title, now, now);
    draft.icon = config.tasks.default_icon.clone();
    fill_draft(&mut draft, &options.fields, &mut ctx, &config, true)?;

    let report = ctx.planner.save_task(&draft, None, now)?.require_applied()?;
    let task = ctx.planner.working().require(&report.id)?.clone();

    let mut human = HumanOutput::new(format!("Added {}", task.id));
    push_task_summary(&mut human, &task);
    human.push_next_step(format!("today show --date {}", dates::format_date(task.start_day())));
    ctx.finish(&mut human);

    emit_success(ctx.output, "add", &SaveOutput { task, report }, Some(&human))
}

pub fn run_edit(options: EditOptions) -> Result<()> {
    let mut ctx = Context::load(&options.globals)?;
    let now = ctx.now;
    let scope = parse_scope(options.scope.as_deref())?;

    let existing = ctx.planner.working().require(&options.id)?.clone();
    let config = ctx.planner.config().clone();
    let mut draft = TaskDraft::from_task(&existing);
    if let Some(title) = options.title {
        draft.title = title;
    }
    fill_draft(&mut draft, &options.fields, &mut ctx, &config, false)?;

    let report = ctx.planner.save_task(&draft, scope, now)?.require_applied()?;
    let task = ctx.planner.working().require(&report.id)?.clone();

    let mut human = HumanOutput::new(format!("Saved {}", task.id));
    push_task_summary(&mut human, &task);
    if report.updated.len() > 1 {
        human.push_summary("series members updated", (report.updated.len() - 1).to_string());
    }
    for removed in &report.removed {
        human.push_detail(format!("removed {removed}"));
    }
    ctx.finish(&mut human);

    emit_success(ctx.output, "edit", &SaveOutput { task, report }, Some(&human))
}

pub fn run_rm(options: RmOptions) -> Result<()> {
    let mut ctx = Context::load(&options.globals)?;
    let scope = parse_scope(options.scope.as_deref())?;

    let report = ctx
        .planner
        .delete_task(&options.id, scope, ctx.now)?
        .require_applied()?;

    let mut human = HumanOutput::new(format!("Deleted {}", options.id));
    if let Some(scope) = scope {
        human.push_summary("scope", scope.as_str());
    }
    human.push_summary("removed", report.removed.len().to_string());
    for removed in report.removed.iter().filter(|id| **id != options.id) {
        human.push_detail(format!("removed {removed}"));
    }
    ctx.finish(&mut human);

    let output = DeleteOutput {
        id: options.id,
        scope,
        report,
    };
    emit_success(ctx.output, "rm", &output, Some(&human))
}

pub fn run_progress(options: IdOptions) -> Result<()> {
    let mut ctx = Context::load(&options.globals)?;
    let task = ctx.planner.advance_task(&options.id, ctx.now)?;

    let header = if task.is_completed() {
        format!("Completed {}", task.title)
    } else {
        format!("Progressed {} to {}", task.title, task.completion_text())
    };
    let mut human = HumanOutput::new(header);
    if let Some(goal) = task.current_goal() {
        human.push_summary("next", goal);
    }
    ctx.finish(&mut human);

    emit_success(ctx.output, "progress", &TaskOutput { task }, Some(&human))
}

pub fn run_unlink(options: IdOptions) -> Result<()> {
    let mut ctx = Context::load(&options.globals)?;
    let task = ctx.planner.unlink_task(&options.id, ctx.now)?;

    let mut human = HumanOutput::new(format!("Unlinked {} from its series", task.id));
    push_task_summary(&mut human, &task);
    ctx.finish(&mut human);

    emit_success(ctx.output, "unlink", &TaskOutput { task }, Some(&human))
}

pub fn run_shunt(options: ShuntOptions) -> Result<()> {
    let mut ctx = Context::load(&options.globals)?;
    let delta = shunt_delta(&options.by, options.back)?;

    let report = ctx.planner.shunt(&options.id, delta, ctx.now)?;

    let mut human = HumanOutput::new(format!("Shunted {} item(s) by {delta}", report.moved.len()));
    for id in &report.unscheduled {
        human.push_warning(format!("{id} no longer fits the day; moved to the next one"));
    }
    for id in &report.skipped_locked {
        human.push_detail(format!("kept locked item {id} in place"));
    }
    ctx.finish(&mut human);

    let output = ShuntOutput {
        id: options.id,
        delta,
        report,
    };
    emit_success(ctx.output, "shunt", &output, Some(&human))
}

fn parse_scope(raw: Option<&str>) -> Result<Option<EditScope>> {
    raw.map(str::parse).transpose()
}

fn shunt_delta(raw: &str, back: bool) -> Result<Timedelta> {
    let delta: Timedelta = raw.parse()?;
    let minutes = delta.abs().hours() * 60 + delta.abs().minutes();
    if minutes == 0 {
        return Err(Error::InvalidArgument(format!(
            "shunt distance '{raw}' must include hours or minutes"
        )));
    }
    if back {
        return Ok(Timedelta::from_minutes(-delta.abs().total_minutes()));
    }
    Ok(delta)
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("title", task.title.clone());
    if task.date_scheduled {
        let when = match task.time_stamp() {
            stamp if stamp.is_empty() => dates::format_date(task.start_day()),
            stamp => format!("{} {stamp}", dates::format_date(task.start_day())),
        };
        human.push_summary("when", when);
    } else {
        human.push_summary("when", "every day until done");
    }
    if task.rule.repeats() {
        human.push_summary("repeats", task.rule.describe());
    }
    if task.kind != TaskKind::Single {
        human.push_summary("progress", task.completion_text());
    }
    if !task.reminders.is_empty() {
        let offsets: Vec<String> = task.reminders.iter().map(|offset| offset.to_string()).collect();
        human.push_summary("reminders", offsets.join(", "));
    }
}

/// Apply command-line fields onto `draft`.
fn fill_draft(
    draft: &mut TaskDraft,
    fields: &TaskArgs,
    ctx: &mut Context,
    config: &Config,
    creating: bool,
) -> Result<()> {
    if let Some(notes) = &fields.notes {
        draft.notes = notes.clone();
    }
    if let Some(icon) = &fields.icon {
        draft.icon = icon.clone();
    }
    if let Some(kind) = fields.kind.as_deref() {
        draft.kind = kind.parse()?;
    } else if creating && !fields.items.is_empty() {
        draft.kind = TaskKind::Multi;
    }
    if let Some(units) = fields.units {
        draft.completed_units = units;
    }
    if let Some(step) = fields.step {
        draft.progress_step = step;
    }
    if let Some(progress) = fields.progress {
        draft.progress = progress;
    }
    if !fields.items.is_empty() {
        draft.sub_items = fields.items.iter().map(SubItem::new).collect();
    }
    if let Some(locked) = fields.locked {
        draft.locked = locked;
    }
    if let Some(autocomplete) = fields.autocomplete {
        draft.autocomplete = autocomplete;
    }

    let default_duration = config.tasks.duration()?;
    apply_schedule(draft, fields, default_duration, ctx.now.date(), creating)?;
    apply_repeat(draft, fields, creating)?;

    if fields.no_reminders {
        draft.reminders.clear();
    } else if !fields.reminders.is_empty() {
        draft.reminders = parse_offsets(&fields.reminders)?;
    } else if creating && draft.time_scheduled {
        draft.reminders = config.reminders.offsets()?;
    }

    if !fields.categories.is_empty() {
        let mut ids = Vec::new();
        for title in &fields.categories {
            let id = ctx.planner.ensure_category(title)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        draft.categories = ids;
    }
    Ok(())
}

fn apply_schedule(
    draft: &mut TaskDraft,
    fields: &TaskArgs,
    default_duration: Timedelta,
    today: NaiveDate,
    creating: bool,
) -> Result<()> {
    if fields.undated {
        let midnight = dates::start_of_day(draft.start);
        draft.date_scheduled = false;
        draft.time_scheduled = false;
        draft.start = midnight;
        draft.end = midnight;
        return Ok(());
    }

    let date = fields.date.as_deref().map(dates::parse_date).transpose()?;
    let start = fields.start.as_deref().map(dates::parse_time).transpose()?;
    let end = fields.end.as_deref().map(dates::parse_time).transpose()?;

    let day = match date {
        Some(day) => day,
        None if draft.date_scheduled && !creating => draft.start.date(),
        None => today,
    };
    let rescheduled = creating
        || date.is_some()
        || start.is_some()
        || end.is_some()
        || fields.untimed
        || fields.repeat.is_some();
    if !rescheduled {
        return Ok(());
    }
    draft.date_scheduled = true;

    let length = draft.end - draft.start;
    if fields.untimed {
        draft.time_scheduled = false;
        draft.start = day.and_time(NaiveTime::MIN);
        draft.end = draft.start;
    } else if let Some(start) = start {
        let keep_length = !creating && draft.time_scheduled;
        draft.time_scheduled = true;
        draft.start = day.and_time(start);
        draft.end = match end {
            Some(end) => day.and_time(end),
            None if keep_length => draft.start + length,
            None => draft.start + default_duration.as_duration(),
        };
    } else if let Some(end) = end {
        if !draft.time_scheduled {
            return Err(Error::InvalidArgument(
                "--end needs --start on an untimed task".to_string(),
            ));
        }
        draft.start = dates::on_day(day, draft.start);
        draft.end = day.and_time(end);
    } else if draft.time_scheduled && !creating {
        draft.start = dates::on_day(day, draft.start);
        draft.end = draft.start + length;
    } else {
        draft.time_scheduled = false;
        draft.start = day.and_time(NaiveTime::MIN);
        draft.end = draft.start;
    }
    Ok(())
}

fn apply_repeat(draft: &mut TaskDraft, fields: &TaskArgs, creating: bool) -> Result<()> {
    let touched = fields.repeat.is_some()
        || fields.every.is_some()
        || fields.on.is_some()
        || fields.until.is_some();
    let day = draft.start.date();
    if !touched {
        if creating || !draft.rule.repeats() {
            draft.rule.start = day;
        }
        return Ok(());
    }

    let existing = draft.rule.clone();
    let class = match fields.repeat.as_deref() {
        Some(raw) => raw.parse::<RepeatClass>()?,
        None => existing.class,
    };
    let same_class = existing.class == class;

    if fields.every.is_some() && !matches!(class, RepeatClass::Day | RepeatClass::Year) {
        return Err(Error::InvalidArgument(
            "--every applies to daily and yearly repeats".to_string(),
        ));
    }
    if fields.on.is_some() && !matches!(class, RepeatClass::Week | RepeatClass::Month) {
        return Err(Error::InvalidArgument(
            "--on applies to weekly and monthly repeats".to_string(),
        ));
    }
    if class == RepeatClass::None && (fields.until.is_some() || fields.every.is_some()) {
        return Err(Error::InvalidArgument(
            "--until and --every need a repeat (use --repeat)".to_string(),
        ));
    }

    let interval = fields
        .every
        .unwrap_or(if same_class { existing.interval } else { 1 });
    let mut rule = match class {
        RepeatClass::None => RepeatRule::none(day),
        RepeatClass::Day => RepeatRule::daily(day, interval),
        RepeatClass::Week => {
            let mask = match fields.on.as_deref() {
                Some(raw) => repeat::parse_weekdays(raw)?,
                None if same_class => existing.weekday_mask,
                None => 1 << dates::weekday_index(day),
            };
            RepeatRule::weekly(day, mask)
        }
        RepeatClass::Month => {
            let mask = match fields.on.as_deref() {
                Some(raw) => repeat::parse_month_days(raw)?,
                None if same_class => existing.month_day_mask,
                None => 1 << dates::month_day_index(day),
            };
            RepeatRule::monthly(day, mask)
        }
        RepeatClass::Year => RepeatRule::yearly(day, interval),
    };

    if existing.repeats() && !creating {
        rule.start = existing.start;
    }
    rule.exclusions = existing.exclusions.clone();
    rule.end = match fields.until.as_deref().map(str::trim) {
        Some("never") => None,
        Some(raw) => Some(dates::parse_date(raw)?),
        None if rule.repeats() => existing.end,
        None => None,
    };

    if rule.repeats() {
        draft.date_scheduled = true;
    }
    draft.rule = rule;
    Ok(())
}

fn parse_offsets(raw: &[String]) -> Result<Vec<Timedelta>> {
    let mut offsets = Vec::new();
    for value in raw {
        let offset: Timedelta = value.parse()?;
        if offset.is_negative() {
            return Err(Error::InvalidArgument(format!(
                "reminder offset '{value}' cannot be negative"
            )));
        }
        if !offsets.contains(&offset) {
            offsets.push(offset);
        }
    }
    Ok(offsets)
}
