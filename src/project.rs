//! Project identity and the on-disk layout of devpool state.
//!
//! ```text
//! <root>/.devpool/
//!   run/<name>.pid        daemon PID files
//!   logs/<name>.log       daemon output (append-only)
//!   logs/replenish.log    background replenishment output
//!   logs/ownership.log    process ownership decisions
//!   pool-state.json       slot name -> claim record
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;
use crate::git;

const STATE_DIR: &str = ".devpool";

#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    /// Sanitized name used to derive sandbox names
    pub name: String,
}

impl Project {
    /// Locate the project from the current directory.
    ///
    /// Uses the enclosing git work tree when there is one, else the directory itself.
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        let root = git::get_repo_root_for(&cwd).unwrap_or(cwd);
        Ok(Self::at(root))
    }

    /// Project rooted at `root`, named after the directory.
    pub fn at(root: PathBuf) -> Self {
        let dir_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = sanitize_name(&dir_name);
        debug!(root = %root.display(), name = %name, "project:resolved");
        Self { root, name }
    }

    /// Apply a configured project name, if any.
    pub fn with_config(mut self, config: &Config) -> Self {
        if let Some(name) = config.project_name.as_deref() {
            let sanitized = sanitize_name(name);
            if !sanitized.is_empty() {
                self.name = sanitized;
            }
        }
        self
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn run_dir(&self) -> PathBuf {
        self.state_dir().join("run")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    pub fn pid_file(&self, daemon: &str) -> PathBuf {
        self.run_dir().join(format!("{}.pid", daemon))
    }

    pub fn daemon_log(&self, daemon: &str) -> PathBuf {
        self.log_dir().join(format!("{}.log", daemon))
    }

    pub fn replenish_log(&self) -> PathBuf {
        self.log_dir().join("replenish.log")
    }

    pub fn ownership_log(&self) -> PathBuf {
        self.log_dir().join("ownership.log")
    }

    pub fn pool_state_file(&self) -> PathBuf {
        self.state_dir().join("pool-state.json")
    }

    /// Command-line substrings that mark a process as belonging to this project:
    /// the absolute root plus `extra`, never the bare project name.
    pub fn ownership_markers(&self, extra: &[String]) -> Vec<String> {
        let mut markers = vec![self.root.display().to_string()];
        markers.extend(extra.iter().filter(|m| !m.trim().is_empty()).cloned());
        markers
    }
}

/// Reduce a name to what container runtimes accept: lowercase alphanumerics and hyphens.
pub fn sanitize_name(name: &str) -> String {
    slug::slugify(name)
}
