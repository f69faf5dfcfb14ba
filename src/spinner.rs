use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner with consistent styling.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    let spinner_style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.blue} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(spinner_style);
    pb.set_message(msg.to_string());
    pb
}

/// Run a slow step (image build, sandbox clone, setup) behind a spinner.
///
/// The spinner is hidden automatically when stderr is not a terminal.
pub fn with_spinner<T, F>(msg: &str, op: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let pb = create_spinner(msg);
    let result = op();
    match &result {
        Ok(_) => pb.finish_with_message(format!("{} {}", style("✔").green(), msg)),
        Err(_) => pb.finish_with_message(format!("{} {}", style("✘").red(), msg)),
    }
    result
}

/// Print a notice about a degraded or unusually slow path.
pub fn notice(msg: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), msg);
}
