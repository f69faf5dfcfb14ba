use anyhow::Result;
use console::style;

use crate::error::EXIT_OK;
use crate::session::SessionIdentity;
use crate::workflow::{self, FinishOptions, FinishOutcome};

use super::{Boundaries, load_project, load_project_at};

pub fn run(work_item_id: Option<&str>, force: bool) -> Result<i32> {
    let identity = SessionIdentity::from_env();
    // Inside a sandbox the pool state belongs to the host project
    let (project, config) = match &identity {
        Some(identity) => load_project_at(identity.host_project.clone())?,
        None => load_project()?,
    };

    let boundaries = Boundaries::new(&config);
    let ctx = boundaries.context(&project, &config);
    let outcome = workflow::finish(
        &ctx,
        &FinishOptions {
            work_item_id,
            force,
        },
        identity.as_ref(),
    )?;

    match outcome {
        FinishOutcome::InSandbox {
            slot,
            work_item_id,
            destroy_command,
        } => {
            println!(
                "{} Finished '{}'; released '{}'.",
                style("✔").green(),
                work_item_id,
                slot
            );
            println!("A sandbox cannot remove itself. On the host, run:");
            println!("  {}", destroy_command);
        }
        FinishOutcome::OnHost {
            slot,
            work_item_id,
            pushed,
        } => {
            let note = if pushed { "" } else { " (changes not pushed)" };
            println!(
                "{} Finished '{}' and removed '{}'{}. The pool is refilling in the background.",
                style("✔").green(),
                work_item_id,
                slot,
                note
            );
        }
    }
    Ok(EXIT_OK)
}
