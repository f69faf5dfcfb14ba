mod cli;
mod cmd;
mod command;
mod config;
mod daemon;
mod error;
mod git;
mod logger;
mod pool;
mod process;
mod project;
mod sandbox;
mod session;
mod spinner;
mod store;
mod template;
mod tracker;
mod workflow;

use console::style;
use tracing::{error, info};

fn main() {
    if let Err(err) = logger::init() {
        eprintln!("devpool: logging disabled: {:#}", err);
    }
    info!(args = ?std::env::args().collect::<Vec<_>>(), "devpool start");

    let code = match cli::run() {
        Ok(code) => {
            info!(code, "devpool finished");
            code
        }
        Err(err) => {
            error!(error = ?err, "devpool failed");
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            error::exit_code_for(&err)
        }
    };
    std::process::exit(code);
}
