use crate::command;
use crate::pool::REPLENISH_SUBCOMMAND;
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "devpool")]
#[command(
    about = "Supervises a project daemon and a pool of pre-warmed sandboxes for per-work-item sessions"
)]
#[command(after_help = "Exit codes: 0 ok/running, 1 failure, 2 usage error, 3 stopped.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the project daemon in the background
    Start {
        /// Catalog command to run as the daemon (defaults to daemon.name)
        #[arg(long)]
        name: Option<String>,

        /// Run attached to this terminal instead of detaching
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the project daemon (SIGTERM, then SIGKILL after the timeout)
    Stop {
        /// Daemon to stop (defaults to daemon.name)
        #[arg(long)]
        name: Option<String>,

        /// Seconds to wait for a graceful exit (defaults to daemon.stop_timeout_secs)
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
    },

    /// Report whether the project daemon is running (exit 0) or stopped (exit 3)
    Status {
        /// Daemon to check (defaults to daemon.name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Run a catalog command once in the foreground
    Run {
        /// Command id from the `commands` section of .devpool.yaml
        #[arg(value_name = "COMMAND_ID")]
        id: String,
    },

    /// List catalog commands (requires the daemon to be running)
    #[command(visible_alias = "ls")]
    List,

    /// Claim a sandbox for a work item and open a shell in it
    #[command(visible_alias = "sw")]
    StartWork {
        /// Work item id known to the tracker
        work_item_id: String,

        /// Mark the work item in progress, assigned to this agent
        #[arg(long, value_name = "NAME")]
        agent: Option<String>,
    },

    /// Commit, push and release a work session
    #[command(visible_alias = "fw")]
    FinishWork {
        /// Work item to finish (required when several sessions are active)
        work_item_id: Option<String>,

        /// Discard uncommitted work instead of failing on commit/push problems
        #[arg(long)]
        force: bool,
    },

    /// List sandboxes that hold work sessions
    #[command(visible_alias = "lc")]
    ListContainers {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Fill the sandbox pool up to its target size
    #[command(visible_alias = "wp")]
    WarmPool {
        /// Only drop claims whose sandbox no longer exists
        #[arg(long)]
        prune: bool,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Run one replenish pass (internal use, spawned in the background)
    #[command(hide = true, name = REPLENISH_SUBCOMMAND)]
    Replenish,
}

// --- Public Entry Point ---

/// Parse arguments and dispatch. Returns the process exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { name, foreground } => command::daemon::start(name.as_deref(), foreground),
        Commands::Stop { name, timeout } => command::daemon::stop(name.as_deref(), timeout),
        Commands::Status { name } => command::daemon::status(name.as_deref()),
        Commands::Run { id } => command::daemon::run(&id),
        Commands::List => command::daemon::list(),
        Commands::StartWork {
            work_item_id,
            agent,
        } => command::start_work::run(&work_item_id, agent.as_deref()),
        Commands::FinishWork {
            work_item_id,
            force,
        } => command::finish_work::run(work_item_id.as_deref(), force),
        Commands::ListContainers { json } => command::list_containers::run(json),
        Commands::WarmPool { prune } => command::warm_pool::run(prune),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(0)
        }
        Commands::Replenish => command::replenish::run(),
    }
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_aliases() {
        assert!(matches!(
            parse(&["devpool", "sw", "wi-1", "--agent", "bot"]),
            Commands::StartWork { work_item_id, agent: Some(agent) } if work_item_id == "wi-1" && agent == "bot"
        ));
        assert!(matches!(
            parse(&["devpool", "fw", "--force"]),
            Commands::FinishWork { work_item_id: None, force: true }
        ));
        assert!(matches!(parse(&["devpool", "lc", "--json"]), Commands::ListContainers { json: true }));
        assert!(matches!(parse(&["devpool", "wp"]), Commands::WarmPool { prune: false }));
        assert!(matches!(parse(&["devpool", "ls"]), Commands::List));
    }

    #[test]
    fn test_daemon_flags() {
        assert!(matches!(
            parse(&["devpool", "stop", "--name", "worker", "--timeout", "3"]),
            Commands::Stop { name: Some(name), timeout: Some(3) } if name == "worker"
        ));
        assert!(matches!(
            parse(&["devpool", "start", "--foreground"]),
            Commands::Start { name: None, foreground: true }
        ));
    }

    #[test]
    fn test_hidden_replenish_command() {
        assert!(matches!(parse(&["devpool", "_replenish"]), Commands::Replenish));
    }

    #[test]
    fn test_run_requires_command_id() {
        assert!(Cli::try_parse_from(["devpool", "run"]).is_err());
    }
}
