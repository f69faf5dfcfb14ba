//! Hidden `_replenish` entry point used by background replenishment.
//!
//! Output lands in the replenish log, so it is plain text without styling.

use anyhow::Result;
use tracing::info;

use crate::error::{EXIT_FAILURE, EXIT_OK};

use super::{Boundaries, load_project};

pub fn run() -> Result<i32> {
    let (project, config) = load_project()?;
    let boundaries = Boundaries::new(&config);
    let ctx = boundaries.context(&project, &config);
    let report = ctx.pool().replenish();

    info!(
        created = report.created.len(),
        errors = report.errors.len(),
        pruned = report.pruned.len(),
        "replenish:done"
    );
    for slot in &report.pruned {
        println!("pruned stale claim: {}", slot);
    }
    for slot in &report.created {
        println!("created: {}", slot);
    }
    for error in &report.errors {
        println!("error: {}", error);
    }
    println!(
        "replenish finished: {} created, {} errors",
        report.created.len(),
        report.errors.len()
    );
    Ok(if report.is_clean() { EXIT_OK } else { EXIT_FAILURE })
}
