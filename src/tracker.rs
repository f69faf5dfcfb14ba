//! Work-item tracker boundary.
//!
//! The tracker is an external CLI (`bd` by default) that speaks JSON. Only
//! the handful of calls the session workflows need are modelled here.

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info};

use crate::cmd::Cmd;

/// The parts of a work item that drive naming and messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub issue_type: String,
}

/// Fields to change on a work item. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkItemUpdate {
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub stage: Option<String>,
}

impl WorkItemUpdate {
    /// Work picked up by `agent`.
    pub fn in_progress(agent: &str) -> Self {
        Self {
            status: Some("in_progress".to_string()),
            assignee: Some(agent.to_string()),
            stage: None,
        }
    }

    /// Work handed over for review.
    pub fn review() -> Self {
        Self {
            stage: Some("review".to_string()),
            ..Self::default()
        }
    }
}

pub trait WorkTracker {
    /// Look up a work item. Unknown ids are an error.
    fn show(&self, id: &str) -> Result<WorkItem>;

    fn update(&self, id: &str, update: &WorkItemUpdate) -> Result<()>;

    fn comment(&self, id: &str, text: &str, author: &str) -> Result<()>;
}

/// Tracker driven through its command-line interface.
pub struct CliTracker {
    binary: String,
}

impl CliTracker {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl WorkTracker for CliTracker {
    fn show(&self, id: &str) -> Result<WorkItem> {
        let output = Cmd::new(&self.binary)
            .args(&["show", id, "--json"])
            .run_and_capture_stdout()
            .with_context(|| format!("Work item '{}' not found", id))?;
        let item = parse_show_output(id, &output)?;
        debug!(id, issue_type = %item.issue_type, "tracker:show");
        Ok(item)
    }

    fn update(&self, id: &str, update: &WorkItemUpdate) -> Result<()> {
        let mut args = vec!["update", id];
        if let Some(status) = &update.status {
            args.extend(["--status", status.as_str()]);
        }
        if let Some(assignee) = &update.assignee {
            args.extend(["--assignee", assignee.as_str()]);
        }
        if let Some(stage) = &update.stage {
            args.extend(["--stage", stage.as_str()]);
        }
        args.push("--json");

        let output = Cmd::new(&self.binary)
            .args(&args)
            .run_and_capture_stdout()
            .with_context(|| format!("Failed to update work item '{}'", id))?;
        check_success(&output).with_context(|| format!("Failed to update work item '{}'", id))?;
        info!(id, ?update, "tracker:updated");
        Ok(())
    }

    fn comment(&self, id: &str, text: &str, author: &str) -> Result<()> {
        let output = Cmd::new(&self.binary)
            .args(&[
                "comment", "add", id, "--comment", text, "--author", author, "--json",
            ])
            .run_and_capture_stdout()
            .with_context(|| format!("Failed to comment on work item '{}'", id))?;
        check_success(&output).with_context(|| format!("Failed to comment on work item '{}'", id))?;
        info!(id, author, "tracker:commented");
        Ok(())
    }
}

fn parse_json(output: &str) -> Result<Value> {
    serde_json::from_str(output.trim()).context("Tracker returned invalid JSON")
}

/// Tracker responses carry `"success": true|false`; anything but true is a failure.
fn check_success(output: &str) -> Result<Value> {
    let value = parse_json(output)?;
    match value.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(value),
        Some(false) => {
            let reason = value
                .get("error")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("tracker reported failure");
            Err(anyhow!("{}", reason))
        }
        None => Err(anyhow!("Tracker response has no 'success' field")),
    }
}

/// Extract the work item from `show --json` output.
///
/// The item may be the top-level object or nested under `issue`, `data` or
/// `item`, and may be wrapped in a one-element array.
pub fn parse_show_output(id: &str, output: &str) -> Result<WorkItem> {
    let value = check_success(output).with_context(|| format!("Work item '{}' not found", id))?;

    let item = ["issue", "data", "item"]
        .iter()
        .find_map(|key| value.get(*key))
        .unwrap_or(&value);
    let item = match item {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| anyhow!("Work item '{}' not found", id))?,
        other => other,
    };

    let field = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);
    let issue_type = field("issueType")
        .or_else(|| field("issue_type"))
        .ok_or_else(|| anyhow!("Tracker response for '{}' has no issueType", id))?;

    Ok(WorkItem {
        id: field("id").unwrap_or_else(|| id.to_string()),
        title: field("title").unwrap_or_default(),
        issue_type,
    })
}
