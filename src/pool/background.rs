//! Detached replenishment: re-invoke this binary with the hidden `_replenish` command.

use anyhow::{Context, Result};
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use tracing::info;

use crate::daemon::logs::open_append;
use crate::project::Project;

/// Hidden subcommand that runs one synchronous replenish pass.
pub const REPLENISH_SUBCOMMAND: &str = "_replenish";

/// Start a replenish pass in its own process group and return its pid without waiting.
///
/// Output goes to the project's replenish log.
pub fn replenish_in_background(project: &Project) -> Result<u32> {
    let exe = std::env::current_exe().context("Failed to locate the devpool executable")?;
    let log_path = project.replenish_log();
    let mut log = open_append(&log_path)?;
    writeln!(
        log,
        "----- devpool: background replenish at {}",
        chrono::Utc::now().to_rfc3339()
    )?;
    let stderr = log
        .try_clone()
        .context("Failed to duplicate log file handle")?;

    let child = Command::new(&exe)
        .arg(REPLENISH_SUBCOMMAND)
        .current_dir(&project.root)
        .stdin(Stdio::null())
        .stdout(log)
        .stderr(stderr)
        .process_group(0)
        .spawn()
        .with_context(|| format!("Failed to spawn {} {}", exe.display(), REPLENISH_SUBCOMMAND))?;

    let pid = child.id();
    info!(pid, log = %log_path.display(), "pool:background replenish started");
    Ok(pid)
}
