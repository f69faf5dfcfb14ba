use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::{debug, trace, warn};

/// A builder for executing external tools with unified error handling
pub struct Cmd<'a> {
    command: &'a str,
    args: Vec<&'a str>,
    workdir: Option<&'a Path>,
}

impl<'a> Cmd<'a> {
    /// Create a new command builder
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            args: Vec::new(),
            workdir: None,
        }
    }

    /// Add multiple arguments
    pub fn args(mut self, args: &[&'a str]) -> Self {
        self.args.extend_from_slice(args);
        self
    }

    /// Set the working directory for the command
    pub fn workdir(mut self, path: &'a Path) -> Self {
        self.workdir = Some(path);
        self
    }

    fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.to_string()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(self.command);
        cmd.args(&self.args);
        if let Some(dir) = self.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Execute the command and return the output
    /// Returns an error if the command fails (non-zero exit code)
    pub fn run(self) -> Result<Output> {
        let display = self.display();
        trace!(command = self.command, args = ?self.args, "cmd:run start");

        let output = self
            .build()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute command: {}", display))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            debug!(
                command = self.command,
                args = ?self.args,
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "cmd:run failure"
            );
            // Some tools report failures on stdout only
            let detail = if stderr.trim().is_empty() {
                tail_lines(stdout.trim(), 20)
            } else {
                tail_lines(stderr.trim(), 20)
            };
            return Err(anyhow!("Command failed: {}\n{}", display, detail));
        }
        trace!(command = self.command, "cmd:run success");
        Ok(output)
    }

    /// Execute the command and return stdout as a trimmed string
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.run()?;
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    /// Execute the command, returning Ok(true) if it succeeds, Ok(false) if it fails.
    /// Used for existence checks such as `podman container exists`.
    pub fn run_as_check(self) -> Result<bool> {
        let display = self.display();
        trace!(command = self.command, args = ?self.args, "cmd:check start");

        let output = self
            .build()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute command: {}", display))?;

        let success = output.status.success();
        trace!(command = self.command, success, "cmd:check result");
        Ok(success)
    }

    /// Run attached to the caller's terminal and return the exit code.
    ///
    /// A child killed by a signal reports `128 + signal`, like a shell would.
    pub fn run_interactive(self) -> Result<i32> {
        let display = self.display();
        debug!(command = self.command, args = ?self.args, "cmd:interactive start");

        let status = self
            .build()
            .status()
            .with_context(|| format!("Failed to execute command: {}", display))?;

        let code = exit_code_of(&status);
        debug!(command = self.command, code, "cmd:interactive exit");
        Ok(code)
    }
}

/// Translate an exit status into a shell-style exit code.
pub fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

/// Log the failure of a best-effort step and report whether it succeeded.
///
/// Cleanup and notification calls go through here so their errors are recorded
/// rather than dropped.
pub fn best_effort(step: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(step, error = %format!("{:#}", e), "best-effort step failed");
            false
        }
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_and_capture_stdout_trims() {
        let out = Cmd::new("sh")
            .args(&["-c", "echo '  hello  '"])
            .run_and_capture_stdout()
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_run_reports_stderr_on_failure() {
        let err = Cmd::new("sh")
            .args(&["-c", "echo boom >&2; exit 4"])
            .run()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Command failed: sh -c"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_run_as_check_maps_exit_status() {
        assert!(Cmd::new("true").run_as_check().unwrap());
        assert!(!Cmd::new("false").run_as_check().unwrap());
    }

    #[test]
    fn test_best_effort_reports_outcome() {
        assert!(best_effort("ok-step", Ok(())));
        assert!(!best_effort("bad-step", Err(anyhow!("nope"))));
    }

    #[test]
    fn test_tail_lines_keeps_last() {
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(tail_lines("a", 5), "a");
    }
}
