#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub struct TestPlanner {
    dir: TempDir,
}

impl TestPlanner {
    /// An initialized planner in a fresh temp directory.
    pub fn init() -> Result<Self, Box<dyn std::error::Error>> {
        let planner = Self::empty()?;
        planner.cmd("2024-01-01 08:00").arg("init").assert().success();
        Ok(planner)
    }

    /// A temp directory with no planner in it yet.
    pub fn empty() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn cmd(&self, now: &str) -> Command {
        let mut cmd = today_cmd();
        cmd.env("TODAY_DIR", self.dir.path())
            .env("TODAY_NOW", now)
            .env_remove("RUST_LOG");
        cmd
    }

    /// Run with `--json` and return the `data` payload of the envelope.
    pub fn json(&self, now: &str, args: &[&str]) -> Value {
        let output = self
            .cmd(now)
            .args(args)
            .arg("--json")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let value: Value = serde_json::from_slice(&output).expect("json envelope");
        assert_eq!(value["status"], "success");
        value["data"].clone()
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join("today.toml");
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn stored_tasks(&self) -> Vec<Value> {
        let raw = fs::read_to_string(self.dir.path().join("tasks.json")).expect("tasks.json");
        let value: Value = serde_json::from_str(&raw).expect("tasks snapshot");
        value["tasks"].as_array().cloned().unwrap_or_default()
    }

    pub fn stored_task(&self, id: &str) -> Option<Value> {
        self.stored_tasks().into_iter().find(|task| task["id"] == id)
    }
}

pub fn today_cmd() -> Command {
    Command::cargo_bin("today").expect("today binary")
}

/// Ids of every item in a `show --json` payload.
pub fn view_ids(data: &Value) -> Vec<String> {
    ["untimed", "timeline"]
        .iter()
        .flat_map(|key| data[*key].as_array().cloned().unwrap_or_default())
        .filter_map(|task| task["id"].as_str().map(str::to_string))
        .collect()
}
