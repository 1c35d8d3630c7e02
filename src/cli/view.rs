//! today show / widget command implementation
//!
//! Both open with a full reconciliation pass, the way the planner starts up,
//! then render one day.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::cli::context::{Context, Globals};
use crate::dates;
use crate::engine::PassReport;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};
use crate::task::Task;
use crate::view::{DayView, ViewFilter};

pub struct ShowOptions {
    pub date: Option<String>,
    pub completed: bool,
    pub pending: bool,
    pub categories: Vec<String>,
    pub globals: Globals,
}

pub struct WidgetOptions {
    pub items: Option<usize>,
    pub globals: Globals,
}

#[derive(Serialize)]
struct ShowOutput {
    #[serde(flatten)]
    view: DayView,
    filtered: bool,
    pass: PassReport,
}

#[derive(Serialize)]
struct WidgetOutput {
    date: chrono::NaiveDate,
    now: NaiveDateTime,
    items: Vec<Task>,
}

pub fn run_show(options: ShowOptions) -> Result<()> {
    let filter = ViewFilter::new(options.completed, options.pending, &options.categories)?;
    let mut ctx = Context::load(&options.globals)?;
    let now = ctx.now;
    let date = match options.date.as_deref() {
        Some(raw) => dates::parse_date(raw)?,
        None => now.date(),
    };

    let pass = ctx.planner.reset(now)?;
    let mut view = if date == pass.date {
        pass.view.clone()
    } else {
        ctx.planner.refresh(date, now)?
    };
    filter.apply(ctx.planner.working(), &mut view, now);

    let mut human = HumanOutput::new(format!("{}", date.format("%A %Y-%m-%d")));
    human.set_day(date);
    if view.is_empty() {
        human.push_detail("nothing planned");
    }
    for task in &view.untimed {
        human.push_detail(format_line(task, now));
    }
    for task in &view.timeline {
        human.push_detail(format_line(task, now));
    }
    for id in &pass.cleanup.duplicates_removed {
        human.push_warning(format!("removed duplicate record {id}"));
    }
    ctx.finish(&mut human);

    let output = ShowOutput {
        view,
        filtered: !filter.shows_everything(),
        pass,
    };
    emit_success(ctx.output, "show", &output, Some(&human))
}

pub fn run_widget(options: WidgetOptions) -> Result<()> {
    let mut ctx = Context::load(&options.globals)?;
    let now = ctx.now;
    let limit = options.items.unwrap_or(ctx.planner.config().view.widget_items);
    if limit == 0 {
        return Err(Error::InvalidArgument("--items must be > 0".to_string()));
    }

    ctx.planner.reset(now)?;
    let items = ctx.planner.widget(limit, now)?;

    let mut human = HumanOutput::new(format!("Around {}", dates::format_time(now)));
    if items.is_empty() {
        human.push_detail("nothing on the timeline");
    }
    for task in &items {
        human.push_detail(format_line(task, now));
    }
    ctx.finish(&mut human);

    let output = WidgetOutput {
        date: now.date(),
        now,
        items,
    };
    emit_success(ctx.output, "widget", &output, Some(&human))
}

fn format_line(task: &Task, now: NaiveDateTime) -> String {
    let mark = if task.is_completed_at(now) { "[x]" } else { "[ ]" };
    let mut line = match task.time_stamp() {
        stamp if stamp.is_empty() => format!("{mark} {}", task.title),
        stamp => format!("{mark} {stamp}  {}", task.title),
    };
    let progress = task.completion_text();
    if !progress.is_empty() {
        line.push_str(&format!(" ({progress})"));
    }
    if task.locked {
        line.push_str(" [locked]");
    }
    line.push_str(&format!("  {}", task.id));
    line
}
