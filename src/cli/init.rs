//! today init command implementation
//!
//! Creates the planner directory with a default config and empty snapshots.

use std::path::PathBuf;

use crate::cli::context::Globals;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

#[derive(serde::Serialize)]
struct InitReport {
    dir: PathBuf,
    created: Vec<PathBuf>,
}

pub fn run(globals: Globals) -> Result<()> {
    let storage = globals.storage()?;
    let created = storage.init()?;
    storage.load_config()?;

    let report = InitReport {
        dir: storage.root().to_path_buf(),
        created,
    };

    let header = if report.created.is_empty() {
        format!("Planner already initialized at {}", report.dir.display())
    } else {
        format!("Initialized planner at {}", report.dir.display())
    };
    let mut human = HumanOutput::new(header);
    for path in &report.created {
        human.push_detail(format!("created {}", path.display()));
    }
    human.push_next_step("today add \"Title\" --date YYYY-MM-DD --start HH:MM");

    emit_success(globals.output(false), "init", &report, Some(&human))
}
