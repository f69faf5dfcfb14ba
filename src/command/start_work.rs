use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::error::UsageError;
use crate::workflow::{self, SlotSource, StartOptions};

use super::{Boundaries, load_project};

/// A tool that must be on PATH, with what to do when it is not.
struct Prerequisite<'a> {
    binary: &'a str,
    hint: &'static str,
}

fn prerequisites(config: &Config) -> Vec<Prerequisite<'_>> {
    vec![
        Prerequisite {
            binary: config.sandbox.runtime(),
            hint: "install podman (or set sandbox.runtime in .devpool.yaml)",
        },
        Prerequisite {
            binary: config.sandbox.integration(),
            hint: "install distrobox (or set sandbox.integration in .devpool.yaml)",
        },
        Prerequisite {
            binary: config.tracker.binary(),
            hint: "install the work-item tracker CLI (or set tracker.binary in .devpool.yaml)",
        },
        Prerequisite {
            binary: "git",
            hint: "install git",
        },
    ]
}

/// Every missing tool with its remediation hint, one per line.
fn missing_tools(required: &[Prerequisite], is_present: impl Fn(&str) -> bool) -> Vec<String> {
    required
        .iter()
        .filter(|p| !is_present(p.binary))
        .map(|p| format!("  {}: not found on PATH; {}", p.binary, p.hint))
        .collect()
}

fn check_prerequisites(config: &Config) -> Result<(), UsageError> {
    let missing = missing_tools(&prerequisites(config), |binary| which::which(binary).is_ok());
    if missing.is_empty() {
        return Ok(());
    }
    Err(UsageError::new(format!(
        "Missing required tools:\n{}",
        missing.join("\n")
    )))
}

pub fn run(work_item_id: &str, agent: Option<&str>) -> Result<i32> {
    let (project, config) = load_project()?;
    check_prerequisites(&config)?;

    let boundaries = Boundaries::new(&config);
    let ctx = boundaries.context(&project, &config);
    let session = workflow::start(
        &ctx,
        &StartOptions {
            work_item_id,
            agent,
        },
    )?;
    info!(
        slot = %session.slot,
        branch = %session.branch,
        exit_code = session.exit_code,
        fallback = session.source == SlotSource::Fallback,
        "start-work:session ended"
    );
    println!(
        "Left '{}'. When done: devpool finish-work {}",
        session.slot, work_item_id
    );
    Ok(session.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tools_lists_each_with_hint() {
        let config = Config::default();
        let missing = missing_tools(&prerequisites(&config), |binary| binary == "git");
        assert_eq!(missing.len(), 3);
        assert!(missing[0].starts_with("  podman: not found on PATH; install podman"));
        assert!(missing[1].contains("distrobox"));
        assert!(missing[2].starts_with("  bd:"));
    }

    #[test]
    fn test_configured_binaries_are_checked() {
        let config: Config =
            serde_yaml::from_str("sandbox:\n  runtime: docker\ntracker:\n  binary: tk\n").unwrap();
        let missing = missing_tools(&prerequisites(&config), |_| false);
        assert!(missing[0].starts_with("  docker:"));
        assert!(missing[2].starts_with("  tk:"));
    }

    #[test]
    fn test_nothing_missing() {
        let config = Config::default();
        assert!(missing_tools(&prerequisites(&config), |_| true).is_empty());
    }
}
