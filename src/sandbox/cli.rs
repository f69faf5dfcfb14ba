//! Podman + distrobox sandbox implementation.
//!
//! The container runtime answers existence and listing questions and builds
//! images; the integration tool creates, enters and removes sandboxes.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use super::{ContainerInfo, SandboxRuntime};
use crate::cmd::Cmd;
use crate::config::SandboxConfig;

/// Format string for `ps`: one `name<TAB>status` line per container.
const PS_FORMAT: &str = "{{.Names}}\t{{.Status}}";

pub struct CliRuntime {
    runtime: String,
    integration: String,
}

impl CliRuntime {
    pub fn new(runtime: impl Into<String>, integration: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            integration: integration.into(),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.runtime(), config.integration())
    }
}

fn as_strs(argv: &[String]) -> Vec<&str> {
    argv.iter().map(String::as_str).collect()
}

impl SandboxRuntime for CliRuntime {
    fn container_exists(&self, name: &str) -> Result<bool> {
        Cmd::new(&self.runtime)
            .args(&["container", "exists", name])
            .run_as_check()
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        Cmd::new(&self.runtime)
            .args(&["image", "exists", image])
            .run_as_check()
    }

    fn build_image(&self, image: &str, dockerfile: &Path, context: &Path) -> Result<()> {
        let dockerfile = dockerfile.to_string_lossy();
        let context_dir = context.to_string_lossy();
        info!(image, dockerfile = %dockerfile, "sandbox:building image");
        Cmd::new(&self.runtime)
            .args(&["build", "-t", image, "-f", &dockerfile, &context_dir])
            .run()
            .with_context(|| format!("Failed to build image '{}'", image))?;
        Ok(())
    }

    fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>> {
        let filter = format!("name={}", prefix);
        let output = Cmd::new(&self.runtime)
            .args(&["ps", "-a", "--filter", &filter, "--format", PS_FORMAT])
            .run_and_capture_stdout()
            .context("Failed to list sandboxes")?;
        Ok(parse_container_list(&output, prefix))
    }

    fn stop(&self, name: &str) -> Result<()> {
        debug!(name, "sandbox:stop");
        Cmd::new(&self.runtime)
            .args(&["stop", name])
            .run()
            .with_context(|| format!("Failed to stop sandbox '{}'", name))?;
        Ok(())
    }

    fn create_from_image(&self, name: &str, image: &str) -> Result<()> {
        info!(name, image, "sandbox:create from image");
        Cmd::new(&self.integration)
            .args(&[
                "create",
                "--name",
                name,
                "--image",
                image,
                "--yes",
                "--no-entry",
            ])
            .run()
            .with_context(|| format!("Failed to create sandbox '{}' from '{}'", name, image))?;
        Ok(())
    }

    fn clone_from(&self, name: &str, source: &str) -> Result<()> {
        info!(name, source, "sandbox:clone");
        Cmd::new(&self.integration)
            .args(&[
                "create",
                "--name",
                name,
                "--clone",
                source,
                "--yes",
                "--no-entry",
            ])
            .run()
            .with_context(|| format!("Failed to clone '{}' into '{}'", source, name))?;
        Ok(())
    }

    fn exec(&self, name: &str, argv: &[String]) -> Result<String> {
        debug!(name, argv = ?argv, "sandbox:exec");
        Cmd::new(&self.integration)
            .args(&["enter", name, "--"])
            .args(&as_strs(argv))
            .run_and_capture_stdout()
    }

    fn enter_interactive(&self, name: &str, argv: &[String]) -> Result<i32> {
        Cmd::new(&self.integration)
            .args(&["enter", name, "--"])
            .args(&as_strs(argv))
            .run_interactive()
    }

    fn remove(&self, name: &str) -> Result<()> {
        if !self.container_exists(name)? {
            debug!(name, "sandbox:remove skipped, not present");
            return Ok(());
        }
        info!(name, "sandbox:remove");
        Cmd::new(&self.integration)
            .args(&["rm", "--force", name])
            .run()
            .with_context(|| format!("Failed to remove sandbox '{}'", name))?;
        Ok(())
    }
}

/// Parse `ps` output, keeping only names that really start with `prefix`.
///
/// The runtime's name filter is a substring match, so it can return more than asked for.
fn parse_container_list(output: &str, prefix: &str) -> Vec<ContainerInfo> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (name, status) = line.split_once('\t').unwrap_or((line, ""));
            let name = name.trim();
            name.starts_with(prefix).then(|| ContainerInfo {
                name: name.to_string(),
                status: status.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container_list() {
        let output = "acme-slot-0\tUp 2 hours\nacme-slot-3\tExited (0) 5 minutes ago\n";
        let containers = parse_container_list(output, "acme-slot-");
        assert_eq!(
            containers,
            vec![
                ContainerInfo {
                    name: "acme-slot-0".to_string(),
                    status: "Up 2 hours".to_string(),
                },
                ContainerInfo {
                    name: "acme-slot-3".to_string(),
                    status: "Exited (0) 5 minutes ago".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_container_list_drops_substring_matches() {
        let output = "old-acme-slot-1\tUp\nacme-slot-1\tUp\n\n";
        let names: Vec<String> = parse_container_list(output, "acme-slot-")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["acme-slot-1"]);
    }

    #[test]
    fn test_parse_container_list_without_status_column() {
        let containers = parse_container_list("acme-template\n", "acme-");
        assert_eq!(containers[0].name, "acme-template");
        assert_eq!(containers[0].status, "");
    }

    #[test]
    fn test_as_strs_preserves_order() {
        let argv = vec!["sh".to_string(), "-c".to_string(), "true".to_string()];
        assert_eq!(as_strs(&argv), vec!["sh", "-c", "true"]);
    }
}
