//! Daemon log file helpers: append-mode handles, tails, and error scanning.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use crate::config::CommandSpec;

/// Lines that look like errors or stack traces.
static ERROR_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|exception|traceback|fatal|panic(ked)?)\b").unwrap()
});

/// How many error-looking lines `status` surfaces for a stopped daemon.
pub const MAX_ERROR_LINES: usize = 200;

/// Lines of log tail kept in a start-failure diagnostic block.
pub const FAILURE_TAIL_LINES: usize = 40;

/// Open `path` for appending, creating it and its directory if needed.
pub fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

fn read_lines(path: &Path) -> Vec<String> {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Last `count` lines of the file. A missing file has no lines.
pub fn tail(path: &Path, count: usize) -> Vec<String> {
    let mut lines = read_lines(path);
    let start = lines.len().saturating_sub(count);
    lines.drain(..start);
    lines
}

/// The most recent `max` error-looking lines, oldest first.
pub fn recent_error_lines(path: &Path, max: usize) -> Vec<String> {
    let mut matches: Vec<String> = read_lines(path)
        .into_iter()
        .filter(|line| ERROR_LINE_RE.is_match(line))
        .collect();
    let start = matches.len().saturating_sub(max);
    matches.drain(..start);
    matches
}

/// Append a one-line launch marker so separate runs are easy to tell apart.
pub fn append_launch_marker(path: &Path, name: &str, spec: &CommandSpec) -> Result<()> {
    let mut file = open_append(path)?;
    writeln!(
        file,
        "----- devpool: starting '{}' at {}: {}",
        name,
        chrono::Utc::now().to_rfc3339(),
        spec.display()
    )?;
    Ok(())
}

/// Append a marked diagnostic block describing a failed start.
pub fn append_start_failure(
    path: &Path,
    name: &str,
    spec: &CommandSpec,
    exit: &str,
    tail: &[String],
) -> Result<()> {
    let mut file = open_append(path)?;
    let env_keys: Vec<&str> = spec.env.keys().map(String::as_str).collect();
    writeln!(
        file,
        "===== devpool: start of '{}' failed at {} =====",
        name,
        chrono::Utc::now().to_rfc3339()
    )?;
    writeln!(file, "command: {}", spec.display())?;
    writeln!(file, "env overrides: {:?}", env_keys)?;
    writeln!(file, "exit: {}", exit)?;
    writeln!(file, "--- last {} log lines ---", tail.len())?;
    for line in tail {
        writeln!(file, "{}", line)?;
    }
    writeln!(file, "===== end of start failure report =====")?;
    Ok(())
}
