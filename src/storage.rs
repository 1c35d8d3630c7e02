//! Storage layer for today
//!
//! Everything lives in one planner directory, chosen by `--dir`,
//! `TODAY_DIR`, or the platform data directory.
//!
//! # Directory Structure
//!
//! ```text
//! <planner>/
//!   today.toml        # Configuration
//!   tasks.json        # Task snapshot (roots, occurrences, standalone tasks)
//!   categories.json   # Category snapshot
//!   today.lock        # Held while a command reads, reconciles and commits
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::{Config, CONFIG_FILE};
use crate::error::{Error, Result};
use crate::lock::{self, FileLock};
use crate::store::Persist;
use crate::task::{Category, Task};

/// Schema tag written into every snapshot
pub const SNAPSHOT_SCHEMA_VERSION: &str = "today.store.v1";

const TASKS_FILE: &str = "tasks.json";
const CATEGORIES_FILE: &str = "categories.json";
const LOCK_FILE: &str = "today.lock";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub schema_version: String,
    pub generated_at: NaiveDateTime,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub schema_version: String,
    pub generated_at: NaiveDateTime,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// Resolve the planner directory when none was given explicitly
pub fn default_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "today")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            Error::OperationFailed(
                "no home directory found; pass --dir or set TODAY_DIR".to_string(),
            )
        })
}

/// Storage manager for a planner directory
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.root.join(TASKS_FILE)
    }

    pub fn categories_file(&self) -> PathBuf {
        self.root.join(CATEGORIES_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Create the directory, a default config and empty snapshots.
    ///
    /// Existing files are left alone. Returns the paths that were created.
    pub fn init(&self) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.root)?;
        let mut created = Vec::new();

        if !self.config_file().exists() {
            Config::default().save(&self.config_file())?;
            created.push(self.config_file());
        }
        if !self.tasks_file().exists() {
            self.write_tasks(&[])?;
            created.push(self.tasks_file());
        }
        if !self.categories_file().exists() {
            self.write_categories(&[])?;
            created.push(self.categories_file());
        }
        Ok(created)
    }

    pub fn is_initialized(&self) -> bool {
        self.tasks_file().exists()
    }

    pub fn lock(&self, timeout_ms: u64) -> Result<FileLock> {
        FileLock::acquire(self.lock_file(), timeout_ms)
    }

    pub fn load_config(&self) -> Result<Config> {
        Config::load_from_dir(&self.root)
    }

    /// Write JSON data to a file atomically
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic(path, json.as_bytes())
    }

    /// Read JSON data from a file
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let data: T = serde_json::from_str(&content)?;
        Ok(data)
    }

    pub fn read_tasks(&self) -> Result<Vec<Task>> {
        let path = self.tasks_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let snapshot: TaskSnapshot = self.read_json(&path)?;
        check_schema(&snapshot.schema_version, &path)?;
        Ok(snapshot.tasks)
    }

    pub fn write_tasks(&self, tasks: &[Task]) -> Result<()> {
        let snapshot = TaskSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            generated_at: Local::now().naive_local(),
            tasks: tasks.to_vec(),
        };
        self.write_json(&self.tasks_file(), &snapshot)
    }

    pub fn read_categories(&self) -> Result<Vec<Category>> {
        let path = self.categories_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let snapshot: CategorySnapshot = self.read_json(&path)?;
        check_schema(&snapshot.schema_version, &path)?;
        Ok(snapshot.categories)
    }

    pub fn write_categories(&self, categories: &[Category]) -> Result<()> {
        let snapshot = CategorySnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            generated_at: Local::now().naive_local(),
            categories: categories.to_vec(),
        };
        self.write_json(&self.categories_file(), &snapshot)
    }
}

fn check_schema(found: &str, path: &Path) -> Result<()> {
    if found != SNAPSHOT_SCHEMA_VERSION {
        return Err(Error::OperationFailed(format!(
            "{} has schema '{found}', expected '{SNAPSHOT_SCHEMA_VERSION}'",
            path.display()
        )));
    }
    Ok(())
}

impl Persist for Storage {
    fn load(&self) -> Result<(Vec<Task>, Vec<Category>)> {
        Ok((self.read_tasks()?, self.read_categories()?))
    }

    fn commit(&self, tasks: &[Task], categories: &[Category]) -> Result<()> {
        self.write_tasks(tasks)?;
        self.write_categories(categories)
    }
}
