//! Shared command setup: planner directory, clock, lock and event sink.

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};

use crate::dates;
use crate::engine::Planner;
use crate::error::{Error, Result};
use crate::events::{EventDestination, EventSink};
use crate::lock::FileLock;
use crate::output::{HumanOutput, OutputOptions};
use crate::reminders::ReminderLog;
use crate::storage::{self, Storage};
use crate::store::Store;

/// Flags accepted by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    pub dir: Option<PathBuf>,
    pub now: Option<String>,
    pub json: bool,
    pub quiet: bool,
    pub events: Option<String>,
}

impl Globals {
    pub fn storage(&self) -> Result<Storage> {
        match &self.dir {
            Some(dir) => Ok(Storage::new(dir.clone())),
            None => Ok(Storage::new(storage::default_dir()?)),
        }
    }

    /// `--now` when given, otherwise the local wall clock to the minute.
    pub fn now(&self) -> Result<NaiveDateTime> {
        match self.now.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => dates::parse_datetime(raw),
            None => Ok(dates::truncate_to_minute(Local::now().naive_local())),
        }
    }

    /// Events on stdout take over stdout; the envelope is suppressed.
    pub fn output(&self, events_to_stdout: bool) -> OutputOptions {
        OutputOptions {
            json: self.json && !events_to_stdout,
            quiet: self.quiet || events_to_stdout,
        }
    }
}

pub fn open_event_sink(events: Option<&str>) -> Result<(Option<EventSink>, bool)> {
    let destination = EventDestination::parse(events);
    let sink = destination.as_ref().map(|dest| dest.open()).transpose()?;
    let events_to_stdout = matches!(destination, Some(EventDestination::Stdout));
    Ok((sink, events_to_stdout))
}

/// An open planner, held under the store lock for the whole command.
pub struct Context {
    pub storage: Storage,
    pub planner: Planner,
    pub now: NaiveDateTime,
    pub output: OutputOptions,
    sink: Option<EventSink>,
    _lock: FileLock,
}

impl Context {
    pub fn load(globals: &Globals) -> Result<Self> {
        let storage = globals.storage()?;
        if !storage.is_initialized() {
            return Err(Error::NotInitialized(storage.root().to_path_buf()));
        }
        let now = globals.now()?;
        let config = storage.load_config()?;
        let lock = storage.lock(config.store.lock_timeout_ms)?;
        let store = Store::open(Box::new(storage.clone()))?;
        let planner = Planner::new(store, config, Box::new(ReminderLog::new()));
        let (sink, events_to_stdout) = open_event_sink(globals.events.as_deref())?;

        tracing::debug!(dir = %storage.root().display(), %now, "planner opened");
        Ok(Self {
            storage,
            planner,
            now,
            output: globals.output(events_to_stdout),
            sink,
            _lock: lock,
        })
    }

    /// Write queued planner events and attach the last pass to `human`.
    ///
    /// A failing event sink becomes a warning, not an error.
    pub fn finish(&mut self, human: &mut HumanOutput) {
        if let Some(pass) = self.planner.last_pass() {
            human.set_pass(pass);
        }
        let events = self.planner.drain_events();
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(err) = sink.emit_all(&events) {
            human.push_warning(format!("event output failed: {err}"));
        }
    }
}
