//! today reset / watch command implementation
//!
//! `reset` runs one full pass. `watch` keeps a planner open: store changes
//! from other processes queue a sync pass, and every tick queues a full pass
//! (a date-change pass when the day rolled over).

use std::sync::mpsc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::cli::context::{open_event_sink, Context, Globals};
use crate::dates;
use crate::engine::{PassReport, Planner, Trigger};
use crate::error::{Error, Result};
use crate::output::{emit_success, format_pass, HumanOutput, OutputOptions};
use crate::queue::{self, Clock, PassOutcome, ReconcileQueue};
use crate::reminders::ReminderLog;
use crate::store::Store;
use crate::timedelta::Timedelta;

const WATCH_DEBOUNCE_MS: u64 = 250;

pub struct WatchOptions {
    pub run_for: Option<String>,
    pub tick: String,
    pub globals: Globals,
}

#[derive(Serialize, Default)]
struct WatchReport {
    passes: usize,
    failed: usize,
    materialized: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last: Option<PassReport>,
}

pub fn run_reset(globals: Globals) -> Result<()> {
    let mut ctx = Context::load(&globals)?;
    let report = ctx.planner.reset(ctx.now)?;

    let mut human = HumanOutput::new(format!("Reset {}", dates::format_date(report.date)));
    push_cleanup_details(&mut human, &report);
    for reminder in &report.reminders {
        human.push_detail(format!(
            "reminder {} at {} for {}",
            reminder.offset,
            dates::format_datetime(reminder.fire_at),
            reminder.title
        ));
    }
    if let Some(seeded) = &report.seeded {
        for id in &seeded.exhausted {
            human.push_warning(format!("series {id} has no occurrence within the scan window"));
        }
    }
    ctx.finish(&mut human);

    emit_success(ctx.output, "reset", &report, Some(&human))
}

pub fn run_watch(options: WatchOptions) -> Result<()> {
    let globals = options.globals;
    let tick = parse_interval(&options.tick, "--tick")?;
    let run_for = options
        .run_for
        .as_deref()
        .map(|raw| parse_interval(raw, "--for"))
        .transpose()?;

    let storage = globals.storage()?;
    if !storage.is_initialized() {
        return Err(Error::NotInitialized(storage.root().to_path_buf()));
    }
    let fixed_now = match globals.now.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(dates::parse_datetime(raw)?),
        _ => None,
    };
    let config = storage.load_config()?;
    let timeout_ms = config.store.lock_timeout_ms;
    let planner = {
        let _lock = storage.lock(timeout_ms)?;
        let store = Store::open(Box::new(storage.clone()))?;
        Planner::new(store, config, Box::new(ReminderLog::new()))
            .with_lock(storage.lock_file(), timeout_ms)
    };

    let (mut sink, events_to_stdout) = open_event_sink(globals.events.as_deref())?;
    let output = globals.output(events_to_stdout);

    let (tx, rx) = mpsc::channel();
    let reconcile = ReconcileQueue::spawn(planner, clock(fixed_now), move |outcome| {
        let _ = tx.send(outcome);
    })?;
    let watcher = queue::spawn_watch(
        storage.root(),
        reconcile.handle()?,
        Duration::from_millis(WATCH_DEBOUNCE_MS),
    )?;
    tracing::info!(dir = %storage.root().display(), "watching planner");

    let now = clock(fixed_now);
    let mut day = now().date();
    reconcile.trigger(Trigger::DateChanged)?;

    let started = Instant::now();
    let mut next_tick = started + tick;
    let mut report = WatchReport::default();
    loop {
        let deadline = match run_for {
            Some(limit) => next_tick.min(started + limit),
            None => next_tick,
        };
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(outcome) => record(outcome, &mut report, &mut sink, output),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        if Instant::now() >= next_tick {
            next_tick += tick;
            let today = now().date();
            let trigger = if today != day {
                day = today;
                Trigger::DateChanged
            } else {
                Trigger::BackgroundWake
            };
            reconcile.trigger(trigger)?;
        }
    }

    drop(watcher);
    reconcile.shutdown()?;
    for outcome in rx.try_iter() {
        record(outcome, &mut report, &mut sink, output);
    }

    let mut human = HumanOutput::new(format!(
        "Stopped watching after {} pass(es)",
        report.passes
    ));
    if let Some(last) = &report.last {
        human.set_pass(last.summary());
    }
    if report.failed > 0 {
        human.push_warning(format!("{} pass(es) failed; see RUST_LOG=today=warn", report.failed));
    }
    emit_success(output, "watch", &report, Some(&human))
}

fn record(
    outcome: PassOutcome,
    report: &mut WatchReport,
    sink: &mut Option<crate::events::EventSink>,
    output: OutputOptions,
) {
    match outcome {
        PassOutcome::Finished { report: pass, events } => {
            if let Some(sink) = sink.as_mut() {
                if let Err(err) = sink.emit_all(&events) {
                    tracing::warn!(%err, "event output failed");
                }
            }
            if !output.json && !output.quiet {
                let label = if pass.kind.full_reset { "full" } else { "quick" };
                println!("{label} {}", format_pass(&pass.summary()));
            }
            report.passes += 1;
            report.materialized += pass.materialized.len();
            report.last = Some(pass);
        }
        PassOutcome::Failed { kind, error } => {
            tracing::warn!(?kind, %error, "pass failed; will retry on the next trigger");
            report.failed += 1;
        }
    }
}

fn push_cleanup_details(human: &mut HumanOutput, report: &PassReport) {
    let cleanup = &report.cleanup;
    let groups = [
        ("removed duplicate", &cleanup.duplicates_removed),
        ("pruned orphan", &cleanup.orphans_pruned),
        ("detached", &cleanup.detached),
        ("dropped category", &cleanup.categories_removed),
    ];
    for (label, ids) in groups {
        for id in ids {
            human.push_detail(format!("{label} {id}"));
        }
    }
}

fn clock(fixed: Option<NaiveDateTime>) -> Clock {
    match fixed {
        Some(at) => Box::new(move || at),
        None => Box::new(|| dates::truncate_to_minute(Local::now().naive_local())),
    }
}

fn parse_interval(raw: &str, flag: &str) -> Result<Duration> {
    let interval: Timedelta = raw.parse()?;
    if interval.total_minutes() <= 0 {
        return Err(Error::InvalidArgument(format!("{flag} must be at least one minute")));
    }
    Ok(Duration::from_secs(interval.total_minutes() as u64 * 60))
}
