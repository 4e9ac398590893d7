//! # Task Descriptor Codec
//!
//! Turns a [`TaskDescriptor`] into one job-list line and back:
//!
//! ```text
//! */30 * * * * /usr/local/bin/strm-mirror sync 1 --task-id 5f0c… # task_id=5f0c… task_name=Movies config_id=1 task_mode=sync
//! # 0 3 * * * /usr/local/bin/strm-mirror validate 1 slow --task-id 9a1e… # task_id=9a1e… task_name=Nightly%20check config_id=1 task_mode=validateSlow
//! ```
//!
//! A disabled task is the whole line behind a leading `#`. The metadata tail
//! follows the first `#` after the command. `task_mode` is authoritative;
//! when it is missing (older lines) the operation is inferred from the
//! command, which also understands the legacy `main.py` /
//! `strm_validator.py` invocations.
//!
//! The set-level helpers ([`list`], [`add`], [`update`], [`delete`],
//! [`reconcile`]) rewrite a whole job-list text. Managed lines are matched
//! by `task_id`, never by position, and every other line is preserved.

use crate::error::{Result, SchedulerError};
use crate::schedule::normalize_schedule;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// What a scheduled task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Sync,
    ValidateFast,
    ValidateSlow,
}

impl OperationKind {
    /// Value of the `task_mode=` tag
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::ValidateFast => "validateFast",
            Self::ValidateSlow => "validateSlow",
        }
    }

    /// Parse a `task_mode=` tag, including the legacy spellings
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "sync" | "strm_creation" => Some(Self::Sync),
            "validateFast" | "strm_validation_quick" => Some(Self::ValidateFast),
            "validateSlow" | "strm_validation_slow" => Some(Self::ValidateSlow),
            _ => None,
        }
    }

    /// Infer the operation from a job command
    pub fn from_command(command: &str) -> Option<Self> {
        let tokens: Vec<&str> = command
            .split_whitespace()
            .map(|t| t.trim_matches(|c| c == '"' || c == '\''))
            .collect();
        let has = |word: &str| tokens.iter().any(|t| *t == word);

        if tokens.iter().any(|t| t.ends_with("strm_validator.py")) {
            return if has("quick") {
                Some(Self::ValidateFast)
            } else if has("slow") {
                Some(Self::ValidateSlow)
            } else {
                None
            };
        }
        if tokens.iter().any(|t| t.ends_with("main.py")) {
            return Some(Self::Sync);
        }

        if has("validate") {
            if has("fast") || has("quick") {
                Some(Self::ValidateFast)
            } else if has("slow") {
                Some(Self::ValidateSlow)
            } else {
                None
            }
        } else if has("sync") {
            Some(Self::Sync)
        } else {
            None
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Accepts the tag form plus `fast`/`quick`/`slow` shorthands
impl FromStr for OperationKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fast" | "quick" => Ok(Self::ValidateFast),
            "slow" => Ok(Self::ValidateSlow),
            other => Self::from_tag(other)
                .ok_or_else(|| SchedulerError::InvalidTask(format!("unknown operation {:?}", other))),
        }
    }
}

/// One scheduled job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: String,
    pub task_name: String,
    pub config_id: String,
    pub operation: OperationKind,
    /// Five-field schedule
    pub schedule: String,
    pub enabled: bool,
}

impl TaskDescriptor {
    pub fn new(
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        config_id: impl Into<String>,
        operation: OperationKind,
        schedule: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            config_id: config_id.into(),
            operation,
            schedule: schedule.into(),
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Reject values that would not survive a round trip through a line.
    /// The schedule must already be in single-space form.
    pub fn validate(&self) -> Result<()> {
        if normalize_schedule(&self.schedule)? != self.schedule {
            return Err(SchedulerError::InvalidSchedule(format!(
                "{:?} is not in normalized form",
                self.schedule
            )));
        }
        for (field, value) in [("task_id", &self.task_id), ("config_id", &self.config_id)] {
            if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '#' || c == '=') {
                return Err(SchedulerError::InvalidTask(format!(
                    "{} {:?} must be a non-empty token",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

/// How the command part of a job line is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    home: Option<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            home: None,
        }
    }

    /// Pass `--home <dir>` so scheduled runs find the same state directory
    pub fn with_home(mut self, home: impl Into<String>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program for a task
    pub fn args(&self, task: &TaskDescriptor) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(home) = &self.home {
            args.push("--home".to_string());
            args.push(home.clone());
        }
        args.extend(match task.operation {
            OperationKind::Sync => vec!["sync".to_string(), task.config_id.clone()],
            OperationKind::ValidateFast => {
                vec!["validate".to_string(), task.config_id.clone(), "fast".to_string()]
            }
            OperationKind::ValidateSlow => {
                vec!["validate".to_string(), task.config_id.clone(), "slow".to_string()]
            }
        });
        args.push("--task-id".to_string());
        args.push(task.task_id.clone());
        args
    }

    pub fn render(&self, task: &TaskDescriptor) -> String {
        let quote = |word: String| {
            if word.contains(char::is_whitespace) {
                format!("\"{}\"", word)
            } else {
                word
            }
        };
        std::iter::once(self.program.clone())
            .chain(self.args(task))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self::new("strm-mirror")
    }
}

/// A line carries a task when its tail names both a task and a configuration
pub fn is_managed(line: &str) -> bool {
    line.contains("task_id=") && line.contains("config_id=")
}

/// Encode a descriptor as one job-list line
pub fn encode(task: &TaskDescriptor, template: &CommandTemplate) -> Result<String> {
    task.validate()?;
    let paths = std::iter::once(&template.program).chain(template.home.iter());
    if let Some(path) = paths.into_iter().find(|p| p.contains(['#', '"', '\n'])) {
        return Err(SchedulerError::InvalidTask(format!(
            "path {:?} cannot appear in a job line",
            path
        )));
    }

    let line = format!(
        "{} {} # task_id={} task_name={} config_id={} task_mode={}",
        task.schedule,
        template.render(task),
        task.task_id,
        urlencoding::encode(&task.task_name),
        task.config_id,
        task.operation.tag(),
    );

    Ok(if task.enabled {
        line
    } else {
        format!("# {}", line)
    })
}

/// Decode one job-list line
pub fn decode(line: &str) -> Result<TaskDescriptor> {
    let trimmed = line.trim();
    let enabled = !trimmed.starts_with('#');
    let body = trimmed.trim_start_matches('#').trim_start();

    let (schedule_command, metadata) = body
        .split_once('#')
        .ok_or_else(|| SchedulerError::decode(line, "missing metadata tail"))?;

    let fields: Vec<&str> = schedule_command.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(SchedulerError::decode(line, "expected a 5-field schedule and a command"));
    }
    let schedule = fields[..5].join(" ");
    let command = fields[5..].join(" ");

    let tags: HashMap<&str, &str> = metadata
        .split_whitespace()
        .filter_map(|item| item.split_once('='))
        .collect();

    let task_id = tags
        .get("task_id")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SchedulerError::decode(line, "missing task_id"))?;
    let config_id = tags
        .get("config_id")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SchedulerError::decode(line, "missing config_id"))?;
    let task_name = tags
        .get("task_name")
        .map(|raw| {
            urlencoding::decode(raw)
                .map(|name| name.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        })
        .unwrap_or_default();

    let inferred = OperationKind::from_command(&command);
    let tagged = tags.get("task_mode").and_then(|tag| OperationKind::from_tag(tag));
    if let (Some(tagged), Some(inferred)) = (tagged, inferred) {
        if tagged != inferred {
            warn!(
                task_id = %task_id,
                tag = %tagged,
                command = %inferred,
                "task_mode disagrees with the command, using task_mode"
            );
        }
    }
    let operation = tagged
        .or(inferred)
        .ok_or_else(|| SchedulerError::decode(line, "cannot determine the operation"))?;

    Ok(TaskDescriptor {
        task_id: task_id.to_string(),
        task_name,
        config_id: config_id.to_string(),
        operation,
        schedule,
        enabled,
    })
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|line| !line.trim().is_empty())
}

fn join(lines: Vec<String>) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

fn line_task_id(line: &str) -> Option<String> {
    if !is_managed(line) {
        return None;
    }
    decode(line).ok().map(|task| task.task_id)
}

/// Every managed task in a job list. Lines that fail to decode are skipped.
pub fn list(text: &str) -> Vec<TaskDescriptor> {
    lines(text)
        .filter(|line| is_managed(line))
        .filter_map(|line| match decode(line) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable job line");
                None
            }
        })
        .collect()
}

/// Append tasks to a job list
pub fn add(text: &str, tasks: &[TaskDescriptor], template: &CommandTemplate) -> Result<String> {
    let mut out: Vec<String> = lines(text).map(str::to_string).collect();
    for task in tasks {
        out.push(encode(task, template)?);
    }
    Ok(join(out))
}

/// Re-encode the line carrying `task.task_id` in place
pub fn update(text: &str, task: &TaskDescriptor, template: &CommandTemplate) -> Result<String> {
    let mut found = false;
    let mut out = Vec::new();
    for line in lines(text) {
        if line_task_id(line).as_deref() == Some(task.task_id.as_str()) {
            found = true;
            out.push(encode(task, template)?);
        } else {
            out.push(line.to_string());
        }
    }

    if !found {
        return Err(SchedulerError::TaskNotFound(task.task_id.clone()));
    }
    Ok(join(out))
}

/// Drop the lines carrying any of `task_ids`
pub fn delete(text: &str, task_ids: &[String]) -> String {
    let ids: HashSet<&str> = task_ids.iter().map(String::as_str).collect();
    join(
        lines(text)
            .filter(|line| {
                line_task_id(line)
                    .map(|id| !ids.contains(id.as_str()))
                    .unwrap_or(true)
            })
            .map(str::to_string)
            .collect(),
    )
}

/// Make the managed lines of `text` match `tasks` exactly: known tasks are
/// rewritten where they stand, unknown managed lines are dropped and new
/// tasks are appended. Unmanaged lines are kept as they are.
pub fn reconcile(text: &str, tasks: &[TaskDescriptor], template: &CommandTemplate) -> Result<String> {
    let by_id: HashMap<&str, &TaskDescriptor> =
        tasks.iter().map(|task| (task.task_id.as_str(), task)).collect();
    let mut written: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for line in lines(text) {
        if !is_managed(line) {
            out.push(line.to_string());
            continue;
        }
        let Some(id) = line_task_id(line) else {
            // Undecodable managed lines are kept for a human to look at
            out.push(line.to_string());
            continue;
        };
        if let Some((&key, task)) = by_id.get_key_value(id.as_str()) {
            if written.insert(key) {
                out.push(encode(task, template)?);
            }
        }
    }

    for task in tasks {
        if !written.contains(task.task_id.as_str()) {
            out.push(encode(task, template)?);
        }
    }

    Ok(join(out))
}
