//! Command output: the JSON envelope and the terminal rendering.
//!
//! Every command prints one envelope under `--json`. Besides `data` or
//! `error` it carries the day the command worked on and a summary of the
//! reconciliation pass it ran. A series edit that still needs a scope is
//! reported as a `decision` listing the commands that would settle it.

use chrono::NaiveDate;
use serde::Serialize;

use crate::edit::EditScope;
use crate::engine::PassSummary;
use crate::error::{exit_codes, Error, Result};

pub const SCHEMA_VERSION: &str = "today.v1";

const DECISION_SCOPES: [EditScope; 3] = [EditScope::This, EditScope::Future, EditScope::All];

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// What a command reports besides its payload.
#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    day: Option<NaiveDate>,
    pass: Option<PassSummary>,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            day: None,
            pass: None,
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    /// The day shown or changed, when it differs from the pass day.
    pub fn set_day(&mut self, day: NaiveDate) {
        self.day = Some(day);
    }

    pub fn set_pass(&mut self, pass: PassSummary) {
        self.pass = Some(pass);
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }

    fn day(&self) -> Option<NaiveDate> {
        self.day.or(self.pass.map(|pass| pass.date))
    }
}

/// One way to settle a pending scope decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub scope: EditScope,
    pub command: String,
}

/// A series edit or delete waiting for the user to pick a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub task_id: String,
    pub choices: Vec<Choice>,
}

impl Decision {
    /// Choices for re-running `command` (`edit` or `rm`) on `task_id`.
    pub fn for_command(command: &str, task_id: &str) -> Self {
        let verb = if command == "rm" { "rm" } else { "edit" };
        Self {
            task_id: task_id.to_string(),
            choices: DECISION_SCOPES
                .iter()
                .map(|scope| Choice {
                    scope: *scope,
                    command: format!("today {verb} {task_id} --scope {scope}"),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Status {
    Success,
    Error,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Body<'a, T: Serialize> {
    Data(&'a T),
    Error(ErrorBody),
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    day: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pass: Option<PassSummary>,
    #[serde(flatten)]
    body: Body<'a, T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<Decision>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    next_steps: &'a [String],
}

impl<T: Serialize> Envelope<'_, T> {
    fn print(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        return Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: Status::Success,
            day: human.and_then(HumanOutput::day),
            pass: human.and_then(|h| h.pass),
            body: Body::Data(data),
            decision: None,
            warnings: human.map_or(&[][..], |h| h.warnings.as_slice()),
            next_steps: human.map_or(&[][..], |h| h.next_steps.as_slice()),
        }
        .print();
    }

    if let Some(human) = human.filter(|_| !options.quiet) {
        println!("{}", format_human(human));
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let decision = match err {
        Error::ScopeRequired(id) => Some(Decision::for_command(command, id)),
        _ => None,
    };
    let next_steps = error_next_steps(err);

    if json {
        return Envelope::<()> {
            schema_version: SCHEMA_VERSION,
            command,
            status: Status::Error,
            day: None,
            pass: None,
            body: Body::Error(ErrorBody {
                message: err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
                details: err.details(),
            }),
            decision,
            warnings: &[],
            next_steps: &next_steps,
        }
        .print();
    }

    eprintln!("{}", format_error(err, decision.as_ref(), &next_steps));
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = vec![output.header.clone()];

    let width = output
        .summary
        .iter()
        .map(|(key, _)| key.len())
        .max()
        .unwrap_or(0);
    for (key, value) in &output.summary {
        if value.is_empty() {
            lines.push(format!("  {key}"));
        } else {
            lines.push(format!("  {key:<width$}  {value}"));
        }
    }
    if let Some(pass) = &output.pass {
        lines.push(format!("  {}", format_pass(pass)));
    }

    if !output.details.is_empty() {
        lines.push(String::new());
        lines.extend(output.details.iter().map(|detail| format!("  {detail}")));
    }
    if !output.warnings.is_empty() || !output.next_steps.is_empty() {
        lines.push(String::new());
    }
    lines.extend(output.warnings.iter().map(|warning| format!("warning: {warning}")));
    lines.extend(output.next_steps.iter().map(|step| format!("next: {step}")));

    lines.join("\n")
}

/// `pass 2024-01-03: 1 materialized, 2 reminder(s), saved`
pub fn format_pass(pass: &PassSummary) -> String {
    let mut parts = vec![
        format!("{} materialized", pass.materialized),
        format!("{} reminder(s)", pass.reminders),
    ];
    if pass.cleaned > 0 {
        parts.push(format!("{} cleaned up", pass.cleaned));
    }
    parts.push(if pass.saved { "saved" } else { "unchanged" }.to_string());
    format!("pass {}: {}", pass.date.format("%Y-%m-%d"), parts.join(", "))
}

fn format_error(err: &Error, decision: Option<&Decision>, next_steps: &[String]) -> String {
    let mut lines = vec![format!("error: {err}")];
    if let Some(decision) = decision {
        lines.push("choose a scope:".to_string());
        for choice in &decision.choices {
            lines.push(format!("  {:<7} {}", choice.scope.as_str(), choice.command));
        }
    }
    lines.extend(next_steps.iter().map(|step| format!("hint: {step}")));
    lines.join("\n")
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        exit_codes::USER_ERROR => "user_error",
        exit_codes::DECISION_REQUIRED => "decision_required",
        _ => "operation_failed",
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    let step = match err {
        Error::NotInitialized(_) => "today init",
        Error::TaskNotFound(_) => "today show --json",
        Error::CategoryNotFound(_) => "today category ls",
        Error::LockFailed(_) => "retry once the other today process finishes",
        Error::InvalidConfig(_) => "fix today.toml then retry",
        _ => return Vec::new(),
    };
    vec![step.to_string()]
}
