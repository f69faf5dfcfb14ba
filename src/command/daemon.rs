use anyhow::Result;
use console::style;
use std::time::Duration;

use crate::config::Config;
use crate::daemon::{DaemonStatus, StartOutcome, StopOutcome, Supervisor};
use crate::error::{EXIT_OK, EXIT_STOPPED};
use crate::process::SystemInspector;
use crate::project::Project;
use crate::store::FsStore;

use super::load_project;

fn inspector(project: &Project, config: &Config) -> SystemInspector {
    SystemInspector::new(
        project.ownership_markers(&config.ownership_markers()),
        Some(project.ownership_log()),
    )
}

pub fn start(name: Option<&str>, foreground: bool) -> Result<i32> {
    let (project, config) = load_project()?;
    let name = name.unwrap_or_else(|| config.daemon.name());
    let spec = config.resolve_command(name)?;
    let inspector = inspector(&project, &config);
    let supervisor = Supervisor::new(&project, &FsStore, &inspector);

    match supervisor.start(name, &spec, foreground)? {
        StartOutcome::AlreadyRunning { pid } => {
            println!("'{}' is already running (pid {})", name, pid);
            Ok(EXIT_OK)
        }
        StartOutcome::Started { pid, log_path } => {
            println!(
                "{} Started '{}' (pid {}). Log: {}",
                style("✔").green(),
                name,
                pid,
                log_path.display()
            );
            Ok(EXIT_OK)
        }
        StartOutcome::Foreground { exit_code } => Ok(exit_code),
    }
}

pub fn stop(name: Option<&str>, timeout_secs: Option<u64>) -> Result<i32> {
    let (project, config) = load_project()?;
    let name = name.unwrap_or_else(|| config.daemon.name());
    let timeout =
        Duration::from_secs(timeout_secs.unwrap_or_else(|| config.daemon.stop_timeout_secs()));
    let inspector = inspector(&project, &config);
    let supervisor = Supervisor::new(&project, &FsStore, &inspector);

    match supervisor.stop(name, timeout)? {
        StopOutcome::NotRunning => println!("'{}' is not running", name),
        StopOutcome::StaleRemoved { .. } => {
            println!("'{}' is not running (removed a stale pid file)", name)
        }
        StopOutcome::Stopped { pid, forced } => {
            let how = if forced { " (killed)" } else { "" };
            println!("{} Stopped '{}' (pid {}){}", style("✔").green(), name, pid, how);
        }
    }
    Ok(EXIT_OK)
}

pub fn status(name: Option<&str>) -> Result<i32> {
    let (project, config) = load_project()?;
    let name = name.unwrap_or_else(|| config.daemon.name());
    let inspector = inspector(&project, &config);
    let supervisor = Supervisor::new(&project, &FsStore, &inspector);

    match supervisor.status(name)? {
        DaemonStatus::Running { pid, log_path } => {
            println!(
                "'{}' is {} (pid {}). Log: {}",
                name,
                style("running").green(),
                pid,
                log_path.display()
            );
            Ok(EXIT_OK)
        }
        DaemonStatus::Stopped {
            log_path,
            recent_errors,
        } => {
            println!("'{}' is {}", name, style("stopped").yellow());
            if let Some(log_path) = log_path
                && !recent_errors.is_empty()
            {
                println!("Recent errors from {}:", log_path.display());
                for line in &recent_errors {
                    println!("  {}", line);
                }
            }
            Ok(EXIT_STOPPED)
        }
    }
}

/// Run a catalog command once, attached to the terminal.
pub fn run(id: &str) -> Result<i32> {
    let (project, config) = load_project()?;
    let spec = config.resolve_command(id)?;
    let inspector = inspector(&project, &config);
    let supervisor = Supervisor::new(&project, &FsStore, &inspector);
    match supervisor.start(id, &spec, true)? {
        StartOutcome::Foreground { exit_code } => Ok(exit_code),
        // Foreground runs never report anything else
        _ => Ok(EXIT_OK),
    }
}

/// Show the command catalog served alongside the default daemon. Requires it to be running.
pub fn list() -> Result<i32> {
    let (project, config) = load_project()?;
    let name = config.daemon.name();
    let inspector = inspector(&project, &config);
    let supervisor = Supervisor::new(&project, &FsStore, &inspector);

    let DaemonStatus::Running { pid, .. } = supervisor.status(name)? else {
        eprintln!("'{}' is not running. Start it with: devpool start", name);
        return Ok(EXIT_STOPPED);
    };

    println!("'{}' running (pid {})", name, pid);
    let ids = config.command_ids();
    if ids.is_empty() {
        println!("No commands configured in .devpool.yaml");
        return Ok(EXIT_OK);
    }
    for id in ids {
        if let Ok(spec) = config.resolve_command(&id) {
            println!("  {:<16} {}", id, spec.display());
        }
    }
    Ok(EXIT_OK)
}
