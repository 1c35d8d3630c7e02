//! Command-line interface for today
//!
//! This module defines the CLI structure using clap derive macros.
//! Each group of subcommands is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::Result;

mod category;
mod context;
mod init;
mod maintain;
mod task;
mod view;

pub use context::Globals;

/// today - a day planner with repeating tasks
///
/// Keeps one-off and repeating tasks, materializes each day's occurrences on
/// demand, and lays them out as an untimed list plus a timeline.
#[derive(Parser, Debug)]
#[command(name = "today")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Planner directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "TODAY_DIR")]
    pub dir: Option<PathBuf>,

    /// Treat this moment as now (YYYY-MM-DD HH:MM)
    #[arg(long, global = true, env = "TODAY_NOW")]
    pub now: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit change events as JSON lines to a file, or `-` for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the planner directory, config and empty store
    Init,

    /// Add a task
    Add {
        /// Task title
        title: String,

        #[command(flatten)]
        fields: TaskArgs,
    },

    /// Edit a task
    Edit {
        /// Task id
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// For series members: this, future, all, or cancel
        #[arg(long)]
        scope: Option<String>,

        #[command(flatten)]
        fields: TaskArgs,
    },

    /// Delete a task
    #[command(alias = "delete")]
    Rm {
        /// Task id
        id: String,

        /// For series members: this, future, all, or cancel
        #[arg(long)]
        scope: Option<String>,
    },

    /// Advance a task's progress by one step
    #[command(alias = "done")]
    Progress {
        /// Task id
        id: String,
    },

    /// Detach an occurrence from its repeating series
    Unlink {
        /// Task id
        id: String,
    },

    /// Push a task and everything after it on its timeline
    Shunt {
        /// Task id to start from
        id: String,

        /// How far, e.g. 30m or 1h15m; negative moves earlier
        #[arg(allow_hyphen_values = true)]
        by: String,

        /// Move earlier instead of later
        #[arg(long)]
        back: bool,
    },

    /// Show a day
    Show {
        /// Day to show (defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Include completed items
        #[arg(long)]
        completed: bool,

        /// Include items not yet completed
        #[arg(long)]
        pending: bool,

        /// Include items in categories matching this glob (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
    },

    /// Show the few timeline items around now
    Widget {
        /// How many items (defaults to view.widget_items)
        #[arg(long)]
        items: Option<usize>,
    },

    /// Run a full reset: seed upcoming occurrences, reminders, cleanup
    Reset,

    /// Keep reconciling while the store or the date changes
    Watch {
        /// Stop after this long, e.g. 10m (runs until killed otherwise)
        #[arg(long = "for")]
        run_for: Option<String>,

        /// How often to check for a new day, e.g. 1m
        #[arg(long, default_value = "1m")]
        tick: String,
    },

    /// Category management
    #[command(subcommand)]
    Category(CategoryCommands),
}

/// Task fields shared by `add` and `edit`
#[derive(Args, Debug, Default, Clone)]
pub struct TaskArgs {
    /// Free-form notes
    #[arg(long)]
    pub notes: Option<String>,

    /// Icon name
    #[arg(long)]
    pub icon: Option<String>,

    /// single, multi, or goal
    #[arg(long)]
    pub kind: Option<String>,

    /// Units needed to complete a goal
    #[arg(long)]
    pub units: Option<i64>,

    /// Units added per progress step
    #[arg(long)]
    pub step: Option<i64>,

    /// Set the progress counter directly
    #[arg(long)]
    pub progress: Option<i64>,

    /// Checklist item (repeatable; replaces the checklist)
    #[arg(long = "item")]
    pub items: Vec<String>,

    /// Schedule on this day (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Start time (HH:MM); makes the task timed
    #[arg(long)]
    pub start: Option<String>,

    /// End time (HH:MM)
    #[arg(long)]
    pub end: Option<String>,

    /// Drop the time of day, keeping the date
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub untimed: bool,

    /// Drop the date, showing the task every day until done
    #[arg(long, conflicts_with_all = ["date", "start", "end", "repeat"])]
    pub undated: bool,

    /// none, day, week, month, or year
    #[arg(long)]
    pub repeat: Option<String>,

    /// Repeat interval in days or years
    #[arg(long)]
    pub every: Option<u32>,

    /// Weekdays (mon,thu) or days of the month (1,15)
    #[arg(long)]
    pub on: Option<String>,

    /// Last day of the series (YYYY-MM-DD, or `never`)
    #[arg(long)]
    pub until: Option<String>,

    /// Reminder offset before start, e.g. 10m (repeatable)
    #[arg(long = "remind")]
    pub reminders: Vec<String>,

    /// Remove all reminders
    #[arg(long, conflicts_with = "reminders")]
    pub no_reminders: bool,

    /// Category title (repeatable; created when missing)
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Keep this item in place when shunting
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub locked: Option<bool>,

    /// Count as done once its end time passes
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub autocomplete: Option<bool>,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommands {
    /// Add a category
    Add {
        /// Category title
        title: String,
    },

    /// List categories
    Ls,

    /// Remove a category by title or id
    Rm {
        /// Category title or id
        category: String,
    },
}

impl Cli {
    fn globals(&self) -> Globals {
        Globals {
            dir: self.dir.clone(),
            now: self.now.clone(),
            json: self.json,
            quiet: self.quiet,
            events: self.events.clone(),
        }
    }

    /// Name used in output envelopes, e.g. `show` or `category rm`.
    pub fn command_name(&self) -> &'static str {
        match &self.command {
            Commands::Init => "init",
            Commands::Add { .. } => "add",
            Commands::Edit { .. } => "edit",
            Commands::Rm { .. } => "rm",
            Commands::Progress { .. } => "progress",
            Commands::Unlink { .. } => "unlink",
            Commands::Shunt { .. } => "shunt",
            Commands::Show { .. } => "show",
            Commands::Widget { .. } => "widget",
            Commands::Reset => "reset",
            Commands::Watch { .. } => "watch",
            Commands::Category(CategoryCommands::Add { .. }) => "category add",
            Commands::Category(CategoryCommands::Ls) => "category ls",
            Commands::Category(CategoryCommands::Rm { .. }) => "category rm",
        }
    }

    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let globals = self.globals();
        match self.command {
            Commands::Init => init::run(globals),
            Commands::Add { title, fields } => task::run_add(task::AddOptions {
                title,
                fields,
                globals,
            }),
            Commands::Edit {
                id,
                title,
                scope,
                fields,
            } => task::run_edit(task::EditOptions {
                id,
                title,
                scope,
                fields,
                globals,
            }),
            Commands::Rm { id, scope } => task::run_rm(task::RmOptions { id, scope, globals }),
            Commands::Progress { id } => task::run_progress(task::IdOptions { id, globals }),
            Commands::Unlink { id } => task::run_unlink(task::IdOptions { id, globals }),
            Commands::Shunt { id, by, back } => task::run_shunt(task::ShuntOptions {
                id,
                by,
                back,
                globals,
            }),
            Commands::Show {
                date,
                completed,
                pending,
                categories,
            } => view::run_show(view::ShowOptions {
                date,
                completed,
                pending,
                categories,
                globals,
            }),
            Commands::Widget { items } => view::run_widget(view::WidgetOptions { items, globals }),
            Commands::Reset => maintain::run_reset(globals),
            Commands::Watch { run_for, tick } => maintain::run_watch(maintain::WatchOptions {
                run_for,
                tick,
                globals,
            }),
            Commands::Category(cmd) => match cmd {
                CategoryCommands::Add { title } => {
                    category::run_add(category::AddOptions { title, globals })
                }
                CategoryCommands::Ls => category::run_list(globals),
                CategoryCommands::Rm { category } => {
                    category::run_rm(category::RmOptions { category, globals })
                }
            },
        }
    }
}
