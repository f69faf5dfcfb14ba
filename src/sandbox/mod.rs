//! Sandbox backends: the container runtime and the environment-integration tool.
//!
//! Everything the pool and the work-session workflows need from the outside
//! world goes through [`SandboxRuntime`], so the engineering core can be
//! exercised against [`fake::FakeRuntime`] in tests.

mod cli;
#[cfg(test)]
pub mod fake;

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

pub use cli::CliRuntime;

/// A sandbox as reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub name: String,
    /// Free-form runtime status such as `Up 3 minutes` or `Exited (0)`.
    pub status: String,
}

pub trait SandboxRuntime {
    fn container_exists(&self, name: &str) -> Result<bool>;

    fn image_exists(&self, image: &str) -> Result<bool>;

    /// Build `image` from `dockerfile` with `context` as the build context.
    fn build_image(&self, image: &str, dockerfile: &Path, context: &Path) -> Result<()>;

    /// All sandboxes, running or not, whose name starts with `prefix`.
    fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>>;

    fn stop(&self, name: &str) -> Result<()>;

    /// Create a fresh sandbox from a base image.
    fn create_from_image(&self, name: &str, image: &str) -> Result<()>;

    /// Create `name` as a copy of the (stopped) sandbox `source`.
    fn clone_from(&self, name: &str, source: &str) -> Result<()>;

    /// Run `argv` inside the sandbox and capture stdout. Non-zero exit is an error.
    fn exec(&self, name: &str, argv: &[String]) -> Result<String>;

    /// Run `argv` inside the sandbox attached to the terminal; returns the exit code.
    fn enter_interactive(&self, name: &str, argv: &[String]) -> Result<i32>;

    /// Force-remove the sandbox. Removing a missing sandbox is not an error.
    fn remove(&self, name: &str) -> Result<()>;
}
