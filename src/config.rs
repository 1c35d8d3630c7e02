//! Configuration loading and management
//!
//! Handles parsing of the planner's `today.toml`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::timedelta::Timedelta;

/// File name of the configuration inside the planner directory
pub const CONFIG_FILE: &str = "today.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Reconciliation passes
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Day view and widget
    #[serde(default)]
    pub view: ViewConfig,

    /// Reminder defaults for new tasks
    #[serde(default)]
    pub reminders: RemindersConfig,

    /// Defaults for new tasks
    #[serde(default)]
    pub tasks: TasksConfig,

    /// On-disk store
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Drop untitled categories during a full reset
    #[serde(default = "default_true")]
    pub clean_categories: bool,

    /// How far ahead a reset looks for a series' next firing day
    #[serde(default = "default_seed_scan_days")]
    pub seed_scan_days: u64,
}

fn default_true() -> bool {
    true
}

fn default_seed_scan_days() -> u64 {
    1462
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            clean_categories: true,
            seed_scan_days: default_seed_scan_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Items shown by `today widget`
    #[serde(default = "default_widget_items")]
    pub widget_items: usize,
}

fn default_widget_items() -> usize {
    3
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            widget_items: default_widget_items(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Offsets applied to new timed tasks that name none, e.g. `["10m"]`
    #[serde(default)]
    pub default_offsets: Vec<String>,
}

impl RemindersConfig {
    pub fn offsets(&self) -> Result<Vec<Timedelta>> {
        self.default_offsets
            .iter()
            .map(|raw| {
                raw.parse::<Timedelta>().map_err(|err| {
                    Error::InvalidConfig(format!("reminders.default_offsets: {err}"))
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Icon for tasks created without one
    #[serde(default = "default_icon")]
    pub default_icon: String,

    /// Length of a timed task given only a start time
    #[serde(default = "default_duration")]
    pub default_duration: String,
}

fn default_icon() -> String {
    crate::task::DEFAULT_ICON.to_string()
}

fn default_duration() -> String {
    "30m".to_string()
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_icon: default_icon(),
            default_duration: default_duration(),
        }
    }
}

impl TasksConfig {
    pub fn duration(&self) -> Result<Timedelta> {
        self.default_duration.parse::<Timedelta>().map_err(|err| {
            Error::InvalidConfig(format!("tasks.default_duration: {err}"))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How long to wait for another process holding the store lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a `today.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a planner directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh.seed_scan_days == 0 {
            return Err(Error::InvalidConfig(
                "refresh.seed_scan_days must be > 0".to_string(),
            ));
        }
        if self.view.widget_items == 0 {
            return Err(Error::InvalidConfig(
                "view.widget_items must be > 0".to_string(),
            ));
        }
        if self.tasks.default_icon.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "tasks.default_icon cannot be empty".to_string(),
            ));
        }
        let duration = self.tasks.duration()?;
        if duration.is_negative() {
            return Err(Error::InvalidConfig(
                "tasks.default_duration cannot be negative".to_string(),
            ));
        }
        for offset in self.reminders.offsets()? {
            if offset.is_negative() {
                return Err(Error::InvalidConfig(format!(
                    "reminders.default_offsets: '{offset}' is negative"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert!(cfg.refresh.clean_categories);
        assert_eq!(cfg.refresh.seed_scan_days, 1462);
        assert_eq!(cfg.view.widget_items, 3);
        assert!(cfg.reminders.default_offsets.is_empty());
        assert_eq!(cfg.tasks.default_icon, crate::task::DEFAULT_ICON);
        assert_eq!(cfg.tasks.duration().expect("duration"), Timedelta::from_minutes(30));
        assert_eq!(cfg.store.lock_timeout_ms, DEFAULT_LOCK_TIMEOUT_MS);
        cfg.validate().expect("defaults validate");
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
[refresh]
clean_categories = false
seed_scan_days = 400

[view]
widget_items = 5

[reminders]
default_offsets = ["10m", "1h"]

[tasks]
default_icon = "star"
default_duration = "1h 15m"

[store]
lock_timeout_ms = 250
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert!(!cfg.refresh.clean_categories);
        assert_eq!(cfg.refresh.seed_scan_days, 400);
        assert_eq!(cfg.view.widget_items, 5);
        assert_eq!(
            cfg.reminders.offsets().expect("offsets"),
            vec![Timedelta::from_minutes(10), Timedelta::from_minutes(60)]
        );
        assert_eq!(cfg.tasks.default_icon, "star");
        assert_eq!(cfg.tasks.duration().expect("duration"), Timedelta::from_minutes(75));
        assert_eq!(cfg.store.lock_timeout_ms, 250);
    }

    #[test]
    fn invalid_offset_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[reminders]\ndefault_offsets = [\"soon\"]").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_widget_items_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[view]\nwidget_items = 0").expect("write config");

        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn load_from_dir_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_dir(dir.path()).expect("defaults");
        assert_eq!(cfg.view.widget_items, 3);
    }

    #[test]
    fn load_from_dir_surfaces_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE), "[view\nwidget_items = 2").expect("write config");
        assert!(Config::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        Config::default().save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("seed_scan_days = 1462"));
        assert!(written.contains("[refresh]"));
    }
}
