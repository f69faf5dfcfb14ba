//! Process liveness and ownership checks.
//!
//! A PID file only names a number; the OS may have handed that number to an
//! unrelated process since it was written. Every PID-file consumer checks both
//! liveness and ownership before acting on it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, trace};

use crate::cmd::Cmd;

/// Liveness and ownership probes, injectable for tests.
pub trait ProcessInspector {
    fn is_alive(&self, pid: u32) -> bool;
    fn is_owned(&self, pid: u32) -> bool;
}

/// Inspector backed by the real process table.
pub struct SystemInspector {
    markers: Vec<String>,
    diagnostics_log: Option<PathBuf>,
}

impl SystemInspector {
    pub fn new(markers: Vec<String>, diagnostics_log: Option<PathBuf>) -> Self {
        Self {
            markers,
            diagnostics_log,
        }
    }
}

impl ProcessInspector for SystemInspector {
    fn is_alive(&self, pid: u32) -> bool {
        is_alive(pid)
    }

    fn is_owned(&self, pid: u32) -> bool {
        is_owned_by_project(pid, &self.markers, self.diagnostics_log.as_deref())
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    // kill(0, ..) addresses the caller's own process group
    if pid == 0 {
        return None;
    }
    i32::try_from(pid).ok().map(Pid::from_raw)
}

/// Whether `pid` names a live process.
///
/// Permission denied counts as alive: the process exists under another user.
/// Zombies count as dead.
pub fn is_alive(pid: u32) -> bool {
    let Some(target) = to_pid(pid) else {
        return false;
    };
    let exists = match signal::kill(target, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    };
    exists && !is_zombie(pid)
}

fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
        return false;
    };
    parse_stat_state(&stat) == Some('Z')
}

/// Extract the state letter from `/proc/<pid>/stat`.
///
/// The command name is wrapped in parentheses and may itself contain spaces or
/// parentheses, so the state is read after the last `)`.
fn parse_stat_state(stat: &str) -> Option<char> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.trim_start().chars().next()
}

/// Read the full command line of `pid`.
///
/// Prefers `/proc/<pid>/cmdline`, falling back to `ps` where procfs is missing.
pub fn read_command_line(pid: u32) -> Option<String> {
    to_pid(pid)?;

    if let Ok(raw) = std::fs::read(format!("/proc/{}/cmdline", pid)) {
        let joined = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            return Some(joined);
        }
    }

    let pid_str = pid.to_string();
    Cmd::new("ps")
        .args(&["-o", "args=", "-p", &pid_str])
        .run_and_capture_stdout()
        .ok()
        .filter(|line| !line.is_empty())
}

/// Case-insensitive check that any marker occurs in the command line.
pub fn command_matches(command_line: &str, markers: &[String]) -> bool {
    let haystack = command_line.to_lowercase();
    markers
        .iter()
        .filter(|m| !m.trim().is_empty())
        .any(|m| haystack.contains(&m.to_lowercase()))
}

/// Whether the process behind `pid` was started from this project.
///
/// Never fails: any introspection problem yields `false`. Each decision is
/// appended to `diagnostics_log` when one is given, to debug false negatives.
pub fn is_owned_by_project(pid: u32, markers: &[String], diagnostics_log: Option<&Path>) -> bool {
    let command_line = read_command_line(pid);
    let owned = command_line
        .as_deref()
        .is_some_and(|line| command_matches(line, markers));

    trace!(pid, owned, ?command_line, "process:ownership");

    if let Some(log) = diagnostics_log {
        let line = format!(
            "{} pid={} owned={} markers={:?} cmdline={:?}\n",
            chrono::Utc::now().to_rfc3339(),
            pid,
            owned,
            markers,
            command_line.as_deref().unwrap_or("<unavailable>")
        );
        if let Err(e) = append_line(log, &line) {
            debug!(error = %e, log = %log.display(), "process:ownership diagnostics not written");
        }
    }

    owned
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Which target a signal was delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTarget {
    Group,
    Process,
}

/// Signal the process group led by `pid`, falling back to the single process.
pub fn signal_group_or_process(pid: u32, sig: Signal) -> Result<SignalTarget> {
    let target = to_pid(pid).ok_or_else(|| anyhow!("Invalid pid {}", pid))?;

    match signal::killpg(target, sig) {
        Ok(()) => return Ok(SignalTarget::Group),
        Err(e) => debug!(pid, signal = ?sig, error = %e, "process:group signal failed, trying pid"),
    }

    match signal::kill(target, sig) {
        Ok(()) => Ok(SignalTarget::Process),
        // Exited between the two calls
        Err(Errno::ESRCH) => Ok(SignalTarget::Process),
        Err(e) => Err(anyhow!("Failed to send {:?} to pid {}: {}", sig, pid, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_pid_zero_and_out_of_range_are_not_alive() {
        assert!(!is_alive(0));
        assert!(!is_alive(u32::MAX));
    }

    #[test]
    fn test_reaped_child_is_not_alive() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_alive(pid));
    }

    #[test]
    fn test_unreaped_child_is_not_alive() {
        let child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        // Give it time to exit and become a zombie
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(!is_alive(pid));
        drop(child);
    }

    #[test]
    fn test_parse_stat_state_handles_parens_in_name() {
        assert_eq!(parse_stat_state("42 (weird) name)) Z 1 2 3"), Some('Z'));
        assert_eq!(parse_stat_state("7 (bash) S 1"), Some('S'));
        assert_eq!(parse_stat_state("garbage"), None);
    }

    #[test]
    fn test_command_matches_is_case_insensitive() {
        let markers = vec!["/Home/Dev/MyProject".to_string()];
        assert!(command_matches(
            "python -m server --root /home/dev/myproject",
            &markers
        ));
        assert!(!command_matches("nginx: worker process", &markers));
    }

    #[test]
    fn test_command_matches_ignores_blank_markers() {
        let markers = vec!["  ".to_string()];
        assert!(!command_matches("anything", &markers));
    }

    #[test]
    fn test_ownership_of_own_process_and_diagnostics() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("logs").join("ownership.log");
        let me = std::process::id();
        let own_line = read_command_line(me).unwrap();
        let marker = own_line.split_whitespace().next().unwrap().to_string();

        assert!(is_owned_by_project(me, &[marker], Some(&log)));
        assert!(!is_owned_by_project(
            me,
            &["definitely-not-in-this-cmdline-1f9c".to_string()],
            Some(&log)
        ));

        let written = std::fs::read_to_string(&log).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.contains("owned=true"));
        assert!(written.contains("owned=false"));
    }

    #[test]
    fn test_ownership_of_missing_process_is_false() {
        assert!(!is_owned_by_project(0, &["x".to_string()], None));
    }
}
