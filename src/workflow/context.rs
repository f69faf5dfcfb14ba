use anyhow::{Result, anyhow};
use std::path::Path;
use tracing::{debug, warn};

use crate::cmd::Cmd;
use crate::config::Config;
use crate::git;
use crate::pool::{self, PoolManager};
use crate::project::Project;
use crate::sandbox::SandboxRuntime;
use crate::store::StateStore;
use crate::template::{TemplateEnv, create_template_env};
use crate::tracker::WorkTracker;

/// Directory inside each sandbox that holds the session checkout.
const WORKSPACE_ROOT: &str = "/workspace";

/// Host-side effects that tests replace.
#[derive(Clone, Copy)]
pub struct Hooks {
    /// URL of the `origin` remote of the project at the given root
    pub origin_url: fn(&Path) -> Result<String>,
    /// Detach a replenish pass, returning its pid
    pub spawn_replenish: fn(&Project) -> Result<u32>,
    /// Run a shell script in the current environment, attached to the terminal
    pub run_shell: fn(&str) -> Result<()>,
}

impl Hooks {
    pub fn system() -> Self {
        Self {
            origin_url: |root| git::get_remote_url("origin", root),
            spawn_replenish: pool::replenish_in_background,
            run_shell: run_shell_attached,
        }
    }
}

fn run_shell_attached(script: &str) -> Result<()> {
    let code = Cmd::new("sh").args(&["-c", script]).run_interactive()?;
    if code != 0 {
        return Err(anyhow!("Script exited with code {}", code));
    }
    Ok(())
}

/// Shared context for work-session workflows
///
/// Holds the project, its configuration and every external boundary the
/// workflows talk to.
pub struct WorkflowContext<'a> {
    pub project: &'a Project,
    pub config: &'a Config,
    pub runtime: &'a dyn SandboxRuntime,
    pub tracker: &'a dyn WorkTracker,
    pub store: &'a dyn StateStore,
    pub hooks: Hooks,
    pub templates: TemplateEnv,
}

impl<'a> WorkflowContext<'a> {
    pub fn new(
        project: &'a Project,
        config: &'a Config,
        runtime: &'a dyn SandboxRuntime,
        tracker: &'a dyn WorkTracker,
        store: &'a dyn StateStore,
        hooks: Hooks,
    ) -> Self {
        Self {
            project,
            config,
            runtime,
            tracker,
            store,
            hooks,
            templates: create_template_env(),
        }
    }

    pub fn pool(&self) -> PoolManager<'a> {
        PoolManager::new(self.runtime, self.store, self.project, &self.config.pool)
    }

    pub fn origin_url(&self) -> Result<String> {
        (self.hooks.origin_url)(&self.project.root)
    }

    /// Checkout location inside a sandbox for a repository.
    pub fn workdir_for(&self, origin_url: &str) -> String {
        let repo = git::repo_name_from_url(origin_url).unwrap_or_else(|| self.project.name.clone());
        format!("{}/{}", WORKSPACE_ROOT, repo)
    }

    /// Kick off background replenishment. Failure is logged, never returned.
    pub fn trigger_replenish(&self) {
        match (self.hooks.spawn_replenish)(self.project) {
            Ok(pid) => debug!(pid, "workflow:replenish triggered"),
            Err(e) => warn!(error = %format!("{:#}", e), "workflow:could not trigger replenish"),
        }
    }
}
