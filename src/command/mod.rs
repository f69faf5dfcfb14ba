pub mod daemon;
pub mod finish_work;
pub mod list_containers;
pub mod replenish;
pub mod start_work;
pub mod warm_pool;

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::project::Project;
use crate::sandbox::CliRuntime;
use crate::store::FsStore;
use crate::tracker::CliTracker;
use crate::workflow::{Hooks, WorkflowContext};

/// The project around the current directory, with its merged configuration.
pub fn load_project() -> Result<(Project, Config)> {
    let project = Project::discover()?;
    let config = Config::load(&project.root)?;
    Ok((project.with_config(&config), config))
}

/// The project rooted at `root`, for commands that run away from it (inside a sandbox).
pub fn load_project_at(root: PathBuf) -> Result<(Project, Config)> {
    let project = Project::at(root);
    let config = Config::load(&project.root)?;
    Ok((project.with_config(&config), config))
}

/// Real external boundaries for a project.
pub struct Boundaries {
    pub runtime: CliRuntime,
    pub tracker: CliTracker,
    pub store: FsStore,
}

impl Boundaries {
    pub fn new(config: &Config) -> Self {
        Self {
            runtime: CliRuntime::from_config(&config.sandbox),
            tracker: CliTracker::new(config.tracker.binary()),
            store: FsStore,
        }
    }

    pub fn context<'a>(&'a self, project: &'a Project, config: &'a Config) -> WorkflowContext<'a> {
        WorkflowContext::new(
            project,
            config,
            &self.runtime,
            &self.tracker,
            &self.store,
            Hooks::system(),
        )
    }
}
