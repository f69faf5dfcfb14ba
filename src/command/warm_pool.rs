use anyhow::Result;
use console::style;

use crate::error::{EXIT_FAILURE, EXIT_OK};
use crate::pool::ReplenishReport;
use crate::spinner::with_spinner;

use super::{Boundaries, load_project};

fn print_report(report: &ReplenishReport) {
    for slot in &report.pruned {
        println!("Dropped stale claim on '{}' (sandbox no longer exists)", slot);
    }
    for slot in &report.created {
        println!("{} Created '{}'", style("✔").green(), slot);
    }
    for error in &report.errors {
        eprintln!("{} {}", style("✘").red(), error);
    }
}

/// Fill the pool synchronously, or with `prune` only reconcile stale claims.
pub fn run(prune: bool) -> Result<i32> {
    let (project, config) = load_project()?;
    let boundaries = Boundaries::new(&config);
    let ctx = boundaries.context(&project, &config);
    let pool = ctx.pool();

    if prune {
        let pruned = pool.prune_stale_claims()?;
        if pruned.is_empty() {
            println!("No stale claims");
        }
        print_report(&ReplenishReport {
            pruned,
            ..Default::default()
        });
        return Ok(EXIT_OK);
    }

    let report = with_spinner(
        &format!("Warming pool to {} slots", pool.size()),
        || Ok(pool.replenish()),
    )?;
    print_report(&report);
    if report.created.is_empty() && report.is_clean() {
        println!("Pool already has {} available slots", pool.size());
    }
    let available = pool.list_available()?.len();
    println!("{} of {} slots available", available, pool.size());

    Ok(if report.is_clean() { EXIT_OK } else { EXIT_FAILURE })
}
