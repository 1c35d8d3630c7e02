//! today - Day Planner Library
//!
//! This library provides the core of the today CLI: repeating tasks whose
//! occurrences are materialized lazily, one day at a time.
//!
//! # Core Concepts
//!
//! - **Series**: a root task carrying a repeat rule, plus one occurrence record
//!   per day it has been looked at, linked into a chain
//! - **Materialization**: occurrences are cloned from the latest earlier chain
//!   member only when a day is viewed or seeded
//! - **Scopes**: edits and deletes on a series member apply to this, future,
//!   or all occurrences, and are never guessed
//! - **Passes**: every change ends in a reconciliation pass that materializes
//!   the day, rebuilds reminders, cleans up and persists
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `today.toml`
//! - `error`: Error types and result aliases
//! - `dates`, `timedelta`: Calendar helpers and minute-based offsets
//! - `repeat`: Repeat rules and firing tests
//! - `task`: Task records, progress and categories
//! - `store`: Working set, chain links and the persistence seam
//! - `materialize`: Occurrence resolution and future seeding
//! - `cleanup`: Duplicate, orphan and category cleanup
//! - `edit`: Scoped save, delete, unlink and progress
//! - `shunt`: Moving a run of timeline items
//! - `view`: Day view assembly, filters and the widget window
//! - `reminders`: Reminder planning behind a scheduler trait
//! - `engine`: The planner and its reconciliation passes
//! - `queue`: Serialized passes for long-running planners, store watching
//! - `storage`: Planner directory and JSON snapshots
//! - `lock`: File locking and atomic writes
//! - `events`, `output`: JSONL events and the shared output envelope

pub mod cleanup;
pub mod cli;
pub mod config;
pub mod dates;
pub mod edit;
pub mod engine;
pub mod error;
pub mod events;
pub mod lock;
pub mod materialize;
pub mod output;
pub mod queue;
pub mod reminders;
pub mod repeat;
pub mod shunt;
pub mod storage;
pub mod store;
pub mod task;
pub mod timedelta;
pub mod view;

pub use error::{Error, Result};
