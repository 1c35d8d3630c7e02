//! Serialized reconciliation for long-running planners.
//!
//! A single worker thread owns the [`Planner`]. One pass runs at a time and
//! at most one waits behind it: triggers arriving meanwhile merge into the
//! waiting pass and a `sync_channel(1)` carries the wake-up. The last
//! assembled view is published as an immutable snapshot readers can hold onto
//! without blocking the worker.

use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use notify::{EventKind as FsEventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::engine::{PassKind, PassReport, Planner, Trigger};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::view::DayView;

/// Files whose change means another writer touched the store.
const WATCHED_FILES: &[&str] = &["tasks.json", "categories.json", "today.toml"];

pub type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

/// What happened to one (possibly merged) pass.
#[derive(Debug)]
pub enum PassOutcome {
    Finished {
        report: PassReport,
        events: Vec<Event>,
    },
    /// The working set keeps its changes; the next pass retries the commit.
    Failed { kind: PassKind, error: Error },
}

/// The pass waiting behind the one in flight.
#[derive(Debug, Default)]
struct Pending {
    kind: Option<PassKind>,
    triggers: usize,
}

type PendingSlot = Arc<Mutex<Pending>>;

fn lock_pending(slot: &PendingSlot) -> std::sync::MutexGuard<'_, Pending> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Cloneable handle for submitting triggers.
///
/// Submitting never blocks: the trigger merges into the waiting pass.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: SyncSender<()>,
    pending: PendingSlot,
}

impl QueueHandle {
    pub fn trigger(&self, trigger: Trigger) -> Result<()> {
        {
            let mut pending = lock_pending(&self.pending);
            let kind = trigger.kind();
            pending.kind = Some(pending.kind.map_or(kind, |queued| queued.merge(kind)));
            pending.triggers += 1;
        }
        match self.tx.try_send(()) {
            // A wake-up is already queued and will pick this trigger up.
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(Error::OperationFailed(
                "reconcile worker has stopped".to_string(),
            )),
        }
    }
}

pub struct ReconcileQueue {
    handle: Option<QueueHandle>,
    view: Arc<RwLock<Arc<DayView>>>,
    worker: Option<JoinHandle<()>>,
}

impl ReconcileQueue {
    /// Start the worker. `on_pass` runs on the worker after every pass.
    pub fn spawn<F>(planner: Planner, clock: Clock, on_pass: F) -> Result<Self>
    where
        F: FnMut(PassOutcome) + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let pending = PendingSlot::default();
        let view = Arc::new(RwLock::new(Arc::new(DayView::empty(clock().date()))));
        let published = Arc::clone(&view);
        let queued = Arc::clone(&pending);

        let worker = thread::Builder::new()
            .name("today-reconcile".to_string())
            .spawn(move || run_worker(planner, clock, rx, queued, published, on_pass))?;

        Ok(Self {
            handle: Some(QueueHandle { tx, pending }),
            view,
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> Result<QueueHandle> {
        self.handle
            .clone()
            .ok_or_else(|| Error::OperationFailed("reconcile queue is shut down".to_string()))
    }

    pub fn trigger(&self, trigger: Trigger) -> Result<()> {
        self.handle()?.trigger(trigger)
    }

    /// The view from the most recent successful pass.
    pub fn view(&self) -> Arc<DayView> {
        match self.view.read() {
            Ok(slot) => Arc::clone(&slot),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Finish queued passes, then stop the worker.
    ///
    /// Handles cloned from this queue keep the worker alive until dropped.
    pub fn shutdown(mut self) -> Result<()> {
        self.handle = None;
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| Error::OperationFailed("reconcile worker panicked".to_string())),
            None => Ok(()),
        }
    }
}

fn run_worker<F>(
    mut planner: Planner,
    clock: Clock,
    rx: Receiver<()>,
    pending: PendingSlot,
    published: Arc<RwLock<Arc<DayView>>>,
    mut on_pass: F,
) where
    F: FnMut(PassOutcome),
{
    while rx.recv().is_ok() {
        let (kind, triggers) = {
            let mut pending = lock_pending(&pending);
            let triggers = std::mem::take(&mut pending.triggers);
            match pending.kind.take() {
                Some(kind) => (kind, triggers),
                // Already taken along with an earlier wake-up.
                None => continue,
            }
        };
        if triggers > 1 {
            tracing::debug!(triggers, "coalesced queued triggers");
        }

        match planner.run_pass(kind, clock()) {
            Ok(report) => {
                let snapshot = Arc::new(report.view.clone());
                match published.write() {
                    Ok(mut slot) => *slot = snapshot,
                    Err(poisoned) => *poisoned.into_inner() = snapshot,
                }
                let events = planner.drain_events();
                on_pass(PassOutcome::Finished { report, events });
            }
            Err(error) => {
                tracing::warn!(%error, "reconciliation pass failed");
                on_pass(PassOutcome::Failed { kind, error });
            }
        }
    }
    tracing::debug!("reconcile worker stopped");
}

/// Watch a planner directory and queue an external-sync pass after changes.
///
/// Bursts of file events within `debounce` collapse into one trigger. The
/// returned watcher must be kept alive; dropping it ends the watch.
pub fn spawn_watch(dir: &Path, handle: QueueHandle, debounce: Duration) -> Result<RecommendedWatcher> {
    let (event_tx, event_rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = event_tx.send(res);
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    thread::spawn(move || {
        let mut pending: Option<Instant> = None;
        loop {
            let timeout = pending
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(3600));
            match event_rx.recv_timeout(timeout) {
                Ok(Ok(event)) => {
                    if touches_store(&event) {
                        pending = Some(Instant::now() + debounce);
                    }
                }
                Ok(Err(err)) => {
                    tracing::warn!(%err, "store watch error");
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if pending.take().is_some() && handle.trigger(Trigger::ExternalSync).is_err() {
                        break;
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    Ok(watcher)
}

fn touches_store(event: &notify::Event) -> bool {
    if matches!(event.kind, FsEventKind::Access(_)) {
        return false;
    }
    event.paths.iter().any(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| WATCHED_FILES.contains(&name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dates;
    use crate::reminders::ReminderLog;
    use crate::repeat::RepeatRule;
    use crate::store::{MemoryBackend, Store};
    use crate::task::Task;
    use chrono::Duration as ChronoDuration;

    fn dt(raw: &str) -> NaiveDateTime {
        dates::parse_datetime(raw).expect("datetime")
    }

    fn planner(backend: &MemoryBackend) -> Planner {
        let store = Store::open(Box::new(backend.clone())).expect("open");
        Planner::new(store, Config::default(), Box::new(ReminderLog::new()))
    }

    fn daily_walk() -> Task {
        let start = dt("2024-05-01 07:00");
        let mut root = Task::new("walk", "Walk", start, start + ChronoDuration::minutes(30), start);
        root.date_scheduled = true;
        root.time_scheduled = true;
        root.rule = RepeatRule::daily(start.date(), 1);
        root
    }

    #[test]
    fn passes_publish_views() {
        let backend = MemoryBackend::with_tasks(vec![daily_walk()]);
        let (tx, rx) = mpsc::channel();
        let queue = ReconcileQueue::spawn(
            planner(&backend),
            Box::new(|| dt("2024-05-03 06:00")),
            move |outcome| {
                let _ = tx.send(outcome);
            },
        )
        .expect("spawn");
        assert!(queue.view().is_empty());

        queue.trigger(Trigger::DateChanged).expect("trigger");
        match rx.recv().expect("outcome") {
            PassOutcome::Finished { report, events } => {
                assert!(report.kind.full_reset);
                assert!(!events.is_empty());
            }
            PassOutcome::Failed { error, .. } => panic!("pass failed: {error}"),
        }
        let view = queue.view();
        assert_eq!(view.timeline.len(), 1);
        assert_eq!(view.timeline[0].id, "walk03052024");

        queue.shutdown().expect("shutdown");
        assert!(backend.tasks().iter().any(|task| task.id == "walk03052024"));
    }

    #[test]
    fn bursts_coalesce_into_fewer_passes() {
        let backend = MemoryBackend::with_tasks(vec![daily_walk()]);
        let (tx, rx) = mpsc::channel();
        let queue = ReconcileQueue::spawn(
            planner(&backend),
            Box::new(|| dt("2024-05-03 06:00")),
            move |outcome| {
                let _ = tx.send(outcome);
            },
        )
        .expect("spawn");

        for _ in 0..20 {
            queue.trigger(Trigger::UserSave).expect("trigger");
        }
        queue.trigger(Trigger::BackgroundWake).expect("trigger");
        queue.shutdown().expect("shutdown");

        let outcomes: Vec<PassOutcome> = rx.iter().collect();
        assert!(!outcomes.is_empty());
        assert!(outcomes.len() <= 21);
        assert!(outcomes.iter().any(|outcome| matches!(
            outcome,
            PassOutcome::Finished { report, .. } if report.kind.full_reset
        )));
    }

    #[test]
    fn at_most_one_pass_waits_behind_a_running_one() {
        let backend = MemoryBackend::with_tasks(vec![daily_walk()]);
        let (tx, rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let queue = ReconcileQueue::spawn(
            planner(&backend),
            Box::new(|| dt("2024-05-03 06:00")),
            move |outcome| {
                let _ = tx.send(outcome);
                // Hold the worker inside the pass until the test lets go.
                let _ = release_rx.recv();
            },
        )
        .expect("spawn");

        queue.trigger(Trigger::UserSave).expect("trigger");
        match rx.recv().expect("first outcome") {
            PassOutcome::Finished { report, .. } => assert!(!report.kind.full_reset),
            PassOutcome::Failed { error, .. } => panic!("pass failed: {error}"),
        }

        for _ in 0..20 {
            queue.trigger(Trigger::UserSave).expect("trigger");
        }
        queue.trigger(Trigger::ExternalSync).expect("trigger");
        queue.trigger(Trigger::DateChanged).expect("trigger");
        drop(release_tx);
        queue.shutdown().expect("shutdown");

        let rest: Vec<PassOutcome> = rx.iter().collect();
        assert_eq!(rest.len(), 1);
        match &rest[0] {
            PassOutcome::Finished { report, .. } => {
                assert!(report.kind.reload);
                assert!(report.kind.full_reset);
            }
            PassOutcome::Failed { error, .. } => panic!("merged pass failed: {error}"),
        }
    }

    #[test]
    fn failed_pass_is_reported_and_retried() {
        let backend = MemoryBackend::with_tasks(vec![daily_walk()]);
        backend.set_fail_commits(true);
        let (tx, rx) = mpsc::channel();
        let queue = ReconcileQueue::spawn(
            planner(&backend),
            Box::new(|| dt("2024-05-03 06:00")),
            move |outcome| {
                let _ = tx.send(outcome);
            },
        )
        .expect("spawn");

        queue.trigger(Trigger::DateChanged).expect("trigger");
        assert!(matches!(rx.recv().expect("outcome"), PassOutcome::Failed { .. }));

        backend.set_fail_commits(false);
        queue.trigger(Trigger::UserSave).expect("trigger");
        match rx.recv().expect("outcome") {
            PassOutcome::Finished { report, .. } => assert!(report.saved),
            PassOutcome::Failed { error, .. } => panic!("retry failed: {error}"),
        }
        queue.shutdown().expect("shutdown");
    }

    #[test]
    fn only_store_files_count_as_changes() {
        let write = notify::Event::new(FsEventKind::Modify(notify::event::ModifyKind::Any))
            .add_path("/planner/tasks.json".into());
        let lock = notify::Event::new(FsEventKind::Modify(notify::event::ModifyKind::Any))
            .add_path("/planner/today.lock".into());
        let read = notify::Event::new(FsEventKind::Access(notify::event::AccessKind::Any))
            .add_path("/planner/tasks.json".into());
        assert!(touches_store(&write));
        assert!(!touches_store(&lock));
        assert!(!touches_store(&read));
    }
}
