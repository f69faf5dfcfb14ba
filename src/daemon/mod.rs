//! PID-file supervision of named background daemons.
//!
//! There is no process manager to lean on: a daemon is "running" exactly when
//! its PID file names a live process whose command line belongs to this
//! project. Anything else found in a PID file is stale and gets removed by
//! whichever operation notices it first.

pub mod logs;

use anyhow::{Context, Result, anyhow};
use nix::sys::signal::Signal;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cmd::exit_code_of;
use crate::config::CommandSpec;
use crate::process::{ProcessInspector, signal_group_or_process};
use crate::project::Project;
use crate::store::StateStore;

/// How long a fresh daemon must survive before start counts as successful.
const START_GRACE: Duration = Duration::from_millis(500);

/// Liveness polling interval while waiting for a daemon to exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long to wait for the process to disappear after SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// What the PID file says once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PidFileState {
    Missing,
    /// The file existed but named nothing trustworthy; it has been removed.
    Stale {
        pid: Option<u32>,
        reason: &'static str,
    },
    Live(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyRunning { pid: u32 },
    Started { pid: u32, log_path: PathBuf },
    Foreground { exit_code: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// No PID file existed.
    NotRunning,
    /// A PID file existed but named a dead or foreign process.
    StaleRemoved { pid: Option<u32> },
    Stopped { pid: u32, forced: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    Running {
        pid: u32,
        log_path: PathBuf,
    },
    Stopped {
        /// Log the error lines were taken from, if any log exists.
        log_path: Option<PathBuf>,
        recent_errors: Vec<String>,
    },
}

/// Starts, stops and reports on named daemons of one project.
pub struct Supervisor<'a> {
    project: &'a Project,
    store: &'a dyn StateStore,
    inspector: &'a dyn ProcessInspector,
}

impl<'a> Supervisor<'a> {
    pub fn new(
        project: &'a Project,
        store: &'a dyn StateStore,
        inspector: &'a dyn ProcessInspector,
    ) -> Self {
        Self {
            project,
            store,
            inspector,
        }
    }

    /// Read and validate the PID file, removing it when stale.
    fn check_pid_file(&self, name: &str) -> Result<PidFileState> {
        let path = self.project.pid_file(name);
        let Some(contents) = self.store.read(&path)? else {
            return Ok(PidFileState::Missing);
        };

        let pid = contents.trim().parse::<u32>().ok().filter(|p| *p > 0);
        let reason = match pid {
            None => "unparsable",
            Some(p) if !self.inspector.is_alive(p) => "dead",
            Some(p) if !self.inspector.is_owned(p) => "foreign",
            Some(p) => return Ok(PidFileState::Live(p)),
        };

        self.store.remove(&path)?;
        info!(daemon = name, ?pid, reason, "daemon:removed stale pid file");
        Ok(PidFileState::Stale { pid, reason })
    }

    /// Start `spec` as daemon `name`.
    ///
    /// In foreground mode the command runs attached to the terminal and its
    /// exit code is returned; no PID file is involved.
    pub fn start(&self, name: &str, spec: &CommandSpec, foreground: bool) -> Result<StartOutcome> {
        let (program, args) = spec
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("Command for '{}' is empty", name))?;

        if foreground {
            info!(daemon = name, command = %spec.display(), "daemon:foreground run");
            let status = Command::new(program)
                .args(args)
                .envs(&spec.env)
                .current_dir(&self.project.root)
                .status()
                .with_context(|| format!("Failed to run '{}'", spec.display()))?;
            return Ok(StartOutcome::Foreground {
                exit_code: exit_code_of(&status),
            });
        }

        if let PidFileState::Live(pid) = self.check_pid_file(name)? {
            debug!(daemon = name, pid, "daemon:already running");
            return Ok(StartOutcome::AlreadyRunning { pid });
        }

        let log_path = self.project.daemon_log(name);
        logs::append_launch_marker(&log_path, name, spec)?;
        let stdout = logs::open_append(&log_path)?;
        let stderr = stdout
            .try_clone()
            .context("Failed to duplicate log file handle")?;

        let mut child = Command::new(program)
            .args(args)
            .envs(&spec.env)
            .current_dir(&self.project.root)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .spawn()
            .with_context(|| format!("Failed to start '{}'", spec.display()))?;
        let pid = child.id();
        info!(daemon = name, pid, command = %spec.display(), "daemon:spawned");

        let pid_path = self.project.pid_file(name);
        if let Err(e) = self.store.write(&pid_path, &pid.to_string()) {
            // Without a PID file nothing could ever stop it
            let _ = child.kill();
            let _ = child.wait();
            return Err(e.context("Failed to record daemon pid; process was killed"));
        }

        std::thread::sleep(START_GRACE);

        let exit = match child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) if !self.inspector.is_alive(pid) => Some("not alive".to_string()),
            Ok(None) => None,
            Err(e) => {
                warn!(daemon = name, pid, error = %e, "daemon:try_wait failed, checking liveness");
                (!self.inspector.is_alive(pid)).then(|| "not alive".to_string())
            }
        };

        if let Some(exit) = exit {
            self.store.remove(&pid_path)?;
            let tail = logs::tail(&log_path, logs::FAILURE_TAIL_LINES);
            if let Err(e) = logs::append_start_failure(&log_path, name, spec, &exit, &tail) {
                warn!(daemon = name, error = %e, "daemon:could not write failure report");
            }
            warn!(daemon = name, pid, exit = %exit, "daemon:exited during startup");
            let mut message = format!(
                "'{}' exited during startup ({}). Log: {}",
                name,
                exit,
                log_path.display()
            );
            if !tail.is_empty() {
                message.push('\n');
                message.push_str(&tail.join("\n"));
            }
            return Err(anyhow!(message));
        }

        // Later calls would treat an unrecognized pid as stale and orphan the process
        if !self.inspector.is_owned(pid) {
            warn!(daemon = name, pid, "daemon:started process not recognized as owned, killing");
            if let Err(e) = signal_group_or_process(pid, Signal::SIGKILL) {
                warn!(daemon = name, pid, error = %e, "daemon:could not kill unrecognized process");
            }
            let _ = child.wait();
            self.store.remove(&pid_path)?;
            return Err(anyhow!(
                "'{}' started (pid {}) but its command line '{}' matches none of this project's \
                 ownership markers, so it could not be supervised and was stopped. \
                 Add a distinctive part of the command line to daemon.markers in .devpool.yaml",
                name,
                pid,
                spec.display()
            ));
        }

        Ok(StartOutcome::Started { pid, log_path })
    }

    /// Stop daemon `name`: SIGTERM, wait up to `timeout`, then SIGKILL.
    pub fn stop(&self, name: &str, timeout: Duration) -> Result<StopOutcome> {
        let pid = match self.check_pid_file(name)? {
            PidFileState::Missing => return Ok(StopOutcome::NotRunning),
            PidFileState::Stale { pid, .. } => return Ok(StopOutcome::StaleRemoved { pid }),
            PidFileState::Live(pid) => pid,
        };
        let pid_path = self.project.pid_file(name);

        let target = signal_group_or_process(pid, Signal::SIGTERM)?;
        info!(daemon = name, pid, ?target, "daemon:sent SIGTERM");
        if self.wait_for_exit(pid, timeout) {
            self.store.remove(&pid_path)?;
            return Ok(StopOutcome::Stopped { pid, forced: false });
        }

        warn!(
            daemon = name,
            pid,
            timeout_secs = timeout.as_secs(),
            "daemon:still alive after SIGTERM, escalating"
        );
        signal_group_or_process(pid, Signal::SIGKILL)?;
        if self.wait_for_exit(pid, KILL_GRACE) {
            self.store.remove(&pid_path)?;
            return Ok(StopOutcome::Stopped { pid, forced: true });
        }

        Err(anyhow!(
            "'{}' (pid {}) survived SIGKILL. PID file kept at {}",
            name,
            pid,
            pid_path.display()
        ))
    }

    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if !self.inspector.is_alive(pid) {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
    }

    /// Report whether daemon `name` is running.
    ///
    /// A stopped daemon comes with recent error lines from the most relevant log.
    pub fn status(&self, name: &str) -> Result<DaemonStatus> {
        if let PidFileState::Live(pid) = self.check_pid_file(name)? {
            return Ok(DaemonStatus::Running {
                pid,
                log_path: self.project.daemon_log(name),
            });
        }

        let log_path = [self.project.daemon_log(name), self.project.replenish_log()]
            .into_iter()
            .find(|p| p.exists());
        let recent_errors = log_path
            .as_deref()
            .map(|p| logs::recent_error_lines(p, logs::MAX_ERROR_LINES))
            .unwrap_or_default();

        Ok(DaemonStatus::Stopped {
            log_path,
            recent_errors,
        })
    }
}
