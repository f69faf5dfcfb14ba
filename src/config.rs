use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::UsageError;

/// Project config file names, looked up at the project root.
const PROJECT_CONFIG_NAMES: [&str; 2] = [".devpool.yaml", ".devpool.yml"];

/// A command to execute: argument vector plus environment overrides.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    #[cfg(test)]
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    /// Human-readable rendering for logs and diagnostics.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Settings for the supervised background daemon
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct DaemonConfig {
    /// Catalog id started by `devpool start` when no --name is given. Default: "server"
    pub name: Option<String>,

    /// Seconds to wait after SIGTERM before SIGKILL. Default: 10
    pub stop_timeout_secs: Option<u64>,

    /// Extra command-line substrings that identify this project's processes.
    /// The project root path and project name are always included.
    pub markers: Option<Vec<String>>,
}

impl DaemonConfig {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("server")
    }

    pub fn stop_timeout_secs(&self) -> u64 {
        self.stop_timeout_secs.unwrap_or(10)
    }

    pub fn markers(&self) -> &[String] {
        self.markers.as_deref().unwrap_or(&[])
    }
}

/// Settings for the pre-warmed sandbox pool
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct PoolConfig {
    /// Target number of ready, unclaimed slots. Default: 3
    pub size: Option<usize>,

    /// Slots are discovered at indices `0..size * scan_multiplier`. Default: 3
    pub scan_multiplier: Option<usize>,

    /// Slot name prefix. Default: "<project>-slot-"
    pub prefix: Option<String>,

    /// Template sandbox name. Default: "<project>-template"
    pub template: Option<String>,

    /// Base image the template is created from. Default: "<project>-base"
    pub image: Option<String>,

    /// Containerfile used to build the base image, relative to the project root.
    /// Default: "Containerfile"
    pub dockerfile: Option<String>,

    /// Command run once inside each fresh sandbox to finish host integration.
    /// Default: ["true"]
    pub init_command: Option<Vec<String>>,
}

impl PoolConfig {
    pub fn size(&self) -> usize {
        self.size.unwrap_or(3)
    }

    pub fn scan_multiplier(&self) -> usize {
        self.scan_multiplier.unwrap_or(3).max(1)
    }

    pub fn prefix(&self, project: &str) -> String {
        self.prefix
            .clone()
            .unwrap_or_else(|| format!("{}-slot-", project))
    }

    pub fn template(&self, project: &str) -> String {
        self.template
            .clone()
            .unwrap_or_else(|| format!("{}-template", project))
    }

    pub fn image(&self, project: &str) -> String {
        self.image
            .clone()
            .unwrap_or_else(|| format!("{}-base", project))
    }

    pub fn dockerfile(&self) -> &str {
        self.dockerfile.as_deref().unwrap_or("Containerfile")
    }

    pub fn init_command(&self) -> Vec<String> {
        self.init_command
            .clone()
            .filter(|argv| !argv.is_empty())
            .unwrap_or_else(|| vec!["true".to_string()])
    }
}

/// External sandbox tooling
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct SandboxConfig {
    /// Container runtime binary. Default: "podman"
    pub runtime: Option<String>,

    /// Environment-integration tool binary. Default: "distrobox"
    pub integration: Option<String>,

    /// Prefix of sandboxes created per work item before pooling existed.
    /// Default: "<project>-"
    pub legacy_prefix: Option<String>,
}

impl SandboxConfig {
    pub fn runtime(&self) -> &str {
        self.runtime.as_deref().unwrap_or("podman")
    }

    pub fn integration(&self) -> &str {
        self.integration.as_deref().unwrap_or("distrobox")
    }

    pub fn legacy_prefix(&self, project: &str) -> String {
        self.legacy_prefix
            .clone()
            .unwrap_or_else(|| format!("{}-", project))
    }
}

/// Work-item tracker integration
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct TrackerConfig {
    /// Tracker CLI binary. Default: "bd"
    pub binary: Option<String>,

    /// Branch bucket used when an item's type has no entry in `type_buckets`.
    /// Default: "task"
    pub default_type: Option<String>,

    /// Maps tracker issue types to branch prefixes (e.g. bug -> fix).
    pub type_buckets: Option<BTreeMap<String, String>>,

    /// Author recorded on audit comments when no agent name is known.
    /// Default: "devpool"
    pub author: Option<String>,
}

impl TrackerConfig {
    pub fn binary(&self) -> &str {
        self.binary.as_deref().unwrap_or("bd")
    }

    pub fn default_type(&self) -> &str {
        self.default_type.as_deref().unwrap_or("task")
    }

    pub fn author(&self) -> &str {
        self.author.as_deref().unwrap_or("devpool")
    }

    /// Type-to-bucket map with built-in entries, overridable per key.
    pub fn type_buckets(&self) -> BTreeMap<String, String> {
        let mut buckets: BTreeMap<String, String> = [
            ("bug", "fix"),
            ("feature", "feature"),
            ("task", "task"),
            ("chore", "chore"),
            ("epic", "epic"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        if let Some(custom) = &self.type_buckets {
            for (k, v) in custom {
                buckets.insert(k.to_lowercase(), v.clone());
            }
        }
        buckets
    }
}

/// Configuration for devpool, read from .devpool.yaml
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Name used to derive sandbox names (optional, defaults to the project directory name)
    #[serde(default)]
    pub project_name: Option<String>,

    /// Named commands: the daemon and one-off `devpool run` targets
    #[serde(default)]
    pub commands: Option<BTreeMap<String, CommandSpec>>,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,
}

impl Config {
    /// Load and merge global and project configurations.
    pub fn load(project_root: &Path) -> anyhow::Result<Self> {
        debug!("config:loading");
        let global_config = Self::load_global()?.unwrap_or_default();
        let project_config = Self::load_project(project_root)?.unwrap_or_default();
        let config = global_config.merge(project_config);
        debug!(
            commands = config.commands.as_ref().map_or(0, |c| c.len()),
            pool_size = config.pool.size(),
            "config:loaded"
        );
        Ok(config)
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config at {}: {}", path.display(), e))?;
        Ok(Some(config))
    }

    fn global_config_dir() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("XDG_CONFIG_HOME")
            && !dir.is_empty()
        {
            return Some(PathBuf::from(dir).join("devpool"));
        }
        home::home_dir().map(|home| home.join(".config").join("devpool"))
    }

    /// Load the global configuration file from the XDG config directory.
    fn load_global() -> anyhow::Result<Option<Self>> {
        let Some(dir) = Self::global_config_dir() else {
            return Ok(None);
        };
        for name in ["config.yaml", "config.yml"] {
            let path = dir.join(name);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }
        Ok(None)
    }

    /// Load `.devpool.yaml` from the project root.
    fn load_project(project_root: &Path) -> anyhow::Result<Option<Self>> {
        for name in PROJECT_CONFIG_NAMES {
            let path = project_root.join(name);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }
        Ok(None)
    }

    /// Merge a project config into a global config.
    /// Project config takes precedence field by field. For markers, "<global>"
    /// expands to the global entries at that position.
    fn merge(self, project: Self) -> Self {
        fn merge_vec_with_placeholder(
            global: Option<Vec<String>>,
            project: Option<Vec<String>>,
        ) -> Option<Vec<String>> {
            match (global, project) {
                (Some(global_items), Some(project_items)) => {
                    if project_items.iter().any(|s| s == "<global>") {
                        let mut result = Vec::new();
                        for item in project_items {
                            if item == "<global>" {
                                result.extend(global_items.clone());
                            } else {
                                result.push(item);
                            }
                        }
                        Some(result)
                    } else {
                        Some(project_items)
                    }
                }
                (global, project) => project.or(global),
            }
        }

        let commands = match (self.commands, project.commands) {
            (Some(mut global), Some(project)) => {
                global.extend(project);
                Some(global)
            }
            (global, project) => project.or(global),
        };

        let type_buckets = match (self.tracker.type_buckets, project.tracker.type_buckets) {
            (Some(mut global), Some(project)) => {
                global.extend(project);
                Some(global)
            }
            (global, project) => project.or(global),
        };

        Self {
            project_name: project.project_name.or(self.project_name),
            commands,
            daemon: DaemonConfig {
                name: project.daemon.name.or(self.daemon.name),
                stop_timeout_secs: project
                    .daemon
                    .stop_timeout_secs
                    .or(self.daemon.stop_timeout_secs),
                markers: merge_vec_with_placeholder(self.daemon.markers, project.daemon.markers),
            },
            pool: PoolConfig {
                size: project.pool.size.or(self.pool.size),
                scan_multiplier: project.pool.scan_multiplier.or(self.pool.scan_multiplier),
                prefix: project.pool.prefix.or(self.pool.prefix),
                template: project.pool.template.or(self.pool.template),
                image: project.pool.image.or(self.pool.image),
                dockerfile: project.pool.dockerfile.or(self.pool.dockerfile),
                init_command: project.pool.init_command.or(self.pool.init_command),
            },
            sandbox: SandboxConfig {
                runtime: project.sandbox.runtime.or(self.sandbox.runtime),
                integration: project.sandbox.integration.or(self.sandbox.integration),
                legacy_prefix: project.sandbox.legacy_prefix.or(self.sandbox.legacy_prefix),
            },
            tracker: TrackerConfig {
                binary: project.tracker.binary.or(self.tracker.binary),
                default_type: project.tracker.default_type.or(self.tracker.default_type),
                type_buckets,
                author: project.tracker.author.or(self.tracker.author),
            },
        }
    }

    /// Look up a catalog command by id.
    ///
    /// An unknown id or an empty argv is a usage error, not a runtime failure.
    pub fn resolve_command(&self, id: &str) -> Result<CommandSpec, UsageError> {
        let spec = self
            .commands
            .as_ref()
            .and_then(|commands| commands.get(id))
            .ok_or_else(|| {
                let known = self.command_ids();
                if known.is_empty() {
                    UsageError::new(format!(
                        "Unknown command '{}': no commands configured in .devpool.yaml",
                        id
                    ))
                } else {
                    UsageError::new(format!(
                        "Unknown command '{}'. Configured commands: {}",
                        id,
                        known.join(", ")
                    ))
                }
            })?;

        if spec.argv.is_empty() {
            return Err(UsageError::new(format!(
                "Command '{}' has an empty argv in .devpool.yaml",
                id
            )));
        }
        Ok(spec.clone())
    }

    /// Ownership markers beyond the project root: configured `daemon.markers`
    /// plus the full command line of every catalog command.
    pub fn ownership_markers(&self) -> Vec<String> {
        let mut markers = self.daemon.markers().to_vec();
        if let Some(commands) = &self.commands {
            markers.extend(
                commands
                    .values()
                    .filter(|spec| !spec.argv.is_empty())
                    .map(CommandSpec::display),
            );
        }
        markers
    }

    /// Configured command ids, sorted.
    pub fn command_ids(&self) -> Vec<String> {
        self.commands
            .as_ref()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults_are_derived_from_project_name() {
        let config = Config::default();
        assert_eq!(config.pool.size(), 3);
        assert_eq!(config.pool.scan_multiplier(), 3);
        assert_eq!(config.pool.prefix("acme"), "acme-slot-");
        assert_eq!(config.pool.template("acme"), "acme-template");
        assert_eq!(config.pool.image("acme"), "acme-base");
        assert_eq!(config.sandbox.legacy_prefix("acme"), "acme-");
        assert_eq!(config.sandbox.runtime(), "podman");
        assert_eq!(config.sandbox.integration(), "distrobox");
        assert_eq!(config.tracker.binary(), "bd");
        assert_eq!(config.daemon.name(), "server");
        assert_eq!(config.pool.init_command(), vec!["true".to_string()]);
    }

    #[test]
    fn test_parse_commands_with_env() {
        let config = parse(
            r#"
commands:
  server:
    argv: ["python", "-m", "acme.server"]
    env:
      ACME_PORT: "8123"
"#,
        );
        let spec = config.resolve_command("server").unwrap();
        assert_eq!(spec.argv, vec!["python", "-m", "acme.server"]);
        assert_eq!(spec.env.get("ACME_PORT").map(String::as_str), Some("8123"));
    }

    #[test]
    fn test_resolve_unknown_command_lists_known_ids() {
        let config = parse("commands:\n  lint:\n    argv: [make, lint]\n");
        let err = config.resolve_command("server").unwrap_err();
        assert!(err.to_string().contains("Unknown command 'server'"));
        assert!(err.to_string().contains("lint"));
    }

    #[test]
    fn test_resolve_empty_argv_is_usage_error() {
        let config = parse("commands:\n  server:\n    argv: []\n");
        assert!(config.resolve_command("server").is_err());
    }

    #[test]
    fn test_merge_project_overrides_global() {
        let global = parse("pool:\n  size: 5\n  image: global-img\nsandbox:\n  runtime: docker\n");
        let project = parse("pool:\n  size: 2\n");
        let merged = global.merge(project);
        assert_eq!(merged.pool.size(), 2);
        assert_eq!(merged.pool.image("x"), "global-img");
        assert_eq!(merged.sandbox.runtime(), "docker");
    }

    #[test]
    fn test_merge_commands_extends_catalog() {
        let global = parse("commands:\n  fmt:\n    argv: [cargo, fmt]\n  server:\n    argv: [old]\n");
        let project = parse("commands:\n  server:\n    argv: [new]\n");
        let merged = global.merge(project);
        assert_eq!(merged.command_ids(), vec!["fmt", "server"]);
        assert_eq!(merged.resolve_command("server").unwrap().argv, vec!["new"]);
    }

    #[test]
    fn test_merge_markers_with_global_placeholder() {
        let global = parse("daemon:\n  markers: [acme_core]\n");
        let project = parse("daemon:\n  markers: [\"<global>\", acme_api]\n");
        let merged = global.merge(project);
        assert_eq!(merged.daemon.markers(), ["acme_core", "acme_api"]);
    }

    #[test]
    fn test_ownership_markers_include_catalog_command_lines() {
        let config = parse(
            "daemon:\n  markers: [acme_core]\ncommands:\n  server:\n    argv: [python, -m, acme.server]\n  empty:\n    argv: []\n",
        );
        assert_eq!(
            config.ownership_markers(),
            vec!["acme_core", "python -m acme.server"]
        );
    }

    #[test]
    fn test_type_buckets_custom_entries_override_builtin() {
        let config = parse("tracker:\n  type_buckets:\n    Bug: bugfix\n    spike: research\n");
        let buckets = config.tracker.type_buckets();
        assert_eq!(buckets.get("bug").map(String::as_str), Some("bugfix"));
        assert_eq!(buckets.get("spike").map(String::as_str), Some("research"));
        assert_eq!(buckets.get("feature").map(String::as_str), Some("feature"));
    }

    #[test]
    fn test_load_project_file_from_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".devpool.yaml"), "pool:\n  size: 7\n").unwrap();
        let config = Config::load_project(dir.path()).unwrap().unwrap();
        assert_eq!(config.pool.size(), 7);
    }

    #[test]
    fn test_load_project_invalid_yaml_reports_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".devpool.yaml"), "pool: [unclosed").unwrap();
        let err = Config::load_project(dir.path()).unwrap_err();
        assert!(err.to_string().contains(".devpool.yaml"));
    }
}
