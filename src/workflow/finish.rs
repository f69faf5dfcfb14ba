use anyhow::{Context, Result};
use tracing::{info, warn};

use super::context::WorkflowContext;
use crate::cmd::best_effort;
use crate::error::UsageError;
use crate::pool::Claims;
use crate::session::SessionIdentity;
use crate::spinner::with_spinner;
use crate::template::{SyncScript, render_sync_script};
use crate::tracker::WorkItemUpdate;

pub struct FinishOptions<'a> {
    pub work_item_id: Option<&'a str>,
    /// Skip (inside) or ignore failures of (host) the commit and push
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishOutcome {
    /// Finished from inside the sandbox; the host still has to destroy it.
    InSandbox {
        slot: String,
        work_item_id: String,
        destroy_command: String,
    },
    OnHost {
        slot: String,
        work_item_id: String,
        pushed: bool,
    },
}

/// Finish a work session, from inside its sandbox or from the host.
pub fn finish(
    ctx: &WorkflowContext,
    options: &FinishOptions,
    identity: Option<&SessionIdentity>,
) -> Result<FinishOutcome> {
    match identity {
        Some(identity) => finish_inside(ctx, options, identity),
        None => finish_on_host(ctx, options),
    }
}

fn commit_message(work_item_id: &str) -> String {
    format!("{}: work session changes", work_item_id)
}

/// Tracker hand-off shared by both paths. Never fails the finish.
fn notify_tracker(ctx: &WorkflowContext, id: &str, slot: &str, branch: &str, pushed: bool) {
    best_effort(
        "move work item to review",
        ctx.tracker.update(id, &WorkItemUpdate::review()),
    );
    let text = if pushed {
        format!("Work session in '{}' finished; branch {} pushed.", slot, branch)
    } else {
        format!(
            "Work session in '{}' finished with --force; branch {} may not be pushed.",
            slot, branch
        )
    };
    best_effort(
        "post audit comment",
        ctx.tracker.comment(id, &text, ctx.config.tracker.author()),
    );
}

fn finish_inside(
    ctx: &WorkflowContext,
    options: &FinishOptions,
    identity: &SessionIdentity,
) -> Result<FinishOutcome> {
    let id = identity.work_item_id.as_str();
    if let Some(requested) = options.work_item_id
        && requested != id
    {
        return Err(UsageError::new(format!(
            "This sandbox belongs to '{}', not '{}'. Run finish-work for '{}' from the host.",
            id, requested, requested
        ))
        .into());
    }

    let pushed = if options.force {
        info!(id, "workflow:finish skipping commit and push (forced)");
        false
    } else {
        let workdir = identity
            .workdir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());
        let message = commit_message(id);
        let script = render_sync_script(
            &ctx.templates,
            &SyncScript {
                workdir: &workdir,
                branch: &identity.branch,
                message: &message,
            },
        )?;
        (ctx.hooks.run_shell)(&script).context(
            "Commit/push failed; nothing was released. Fix it and retry, or discard: devpool finish-work --force",
        )?;
        true
    };

    notify_tracker(ctx, id, &identity.sandbox, &identity.branch, pushed);
    ctx.pool().release(&identity.sandbox)?;

    Ok(FinishOutcome::InSandbox {
        slot: identity.sandbox.clone(),
        work_item_id: id.to_string(),
        destroy_command: format!(
            "{} rm --force {}",
            ctx.config.sandbox.integration(),
            identity.sandbox
        ),
    })
}

/// Pick the (slot, work item) to finish from the host.
fn select_target(claims: &Claims, work_item_id: Option<&str>) -> Result<(String, String)> {
    if let Some(id) = work_item_id {
        return claims
            .iter()
            .find(|(_, claim)| claim.work_item_id == id)
            .map(|(slot, _)| (slot.clone(), id.to_string()))
            .ok_or_else(|| UsageError::new(format!("No active session for work item '{}'", id)).into());
    }

    let mut entries = claims.iter();
    match (entries.next(), entries.next()) {
        (None, _) => Err(UsageError::new("No active work sessions to finish").into()),
        (Some((slot, claim)), None) => Ok((slot.clone(), claim.work_item_id.clone())),
        (Some(_), Some(_)) => {
            let candidates: Vec<String> = claims
                .iter()
                .map(|(slot, claim)| {
                    format!("  {}  {}  {}", claim.work_item_id, slot, claim.branch)
                })
                .collect();
            Err(UsageError::new(format!(
                "Several sessions are active; pick one with: devpool finish-work <id>\n{}",
                candidates.join("\n")
            ))
            .into())
        }
    }
}

fn finish_on_host(ctx: &WorkflowContext, options: &FinishOptions) -> Result<FinishOutcome> {
    let pool = ctx.pool();
    let claims = pool.claims()?;
    let (slot, id) = select_target(&claims, options.work_item_id)?;
    let branch = claims
        .get(&slot)
        .map(|c| c.branch.clone())
        .unwrap_or_default();
    info!(id = %id, slot = %slot, branch = %branch, "workflow:finish on host");

    let origin = ctx
        .origin_url()
        .context("Could not determine the 'origin' remote of this project")?;
    let workdir = ctx.workdir_for(&origin);
    let message = commit_message(&id);
    let script = render_sync_script(
        &ctx.templates,
        &SyncScript {
            workdir: &workdir,
            branch: &branch,
            message: &message,
        },
    )?;

    let sync = with_spinner(&format!("Committing and pushing {} in '{}'", branch, slot), || {
        ctx.runtime
            .exec(&slot, &["sh".to_string(), "-c".to_string(), script])
    });
    let pushed = match sync {
        Ok(_) => true,
        Err(e) if options.force => {
            warn!(slot = %slot, error = %format!("{:#}", e), "workflow:push failed, continuing (forced)");
            false
        }
        Err(e) => {
            return Err(e.context(format!(
                "Commit/push in '{}' failed; the sandbox and claim were kept. Retry: devpool finish-work {} (or add --force to discard)",
                slot, id
            )));
        }
    };

    notify_tracker(ctx, &id, &slot, &branch, pushed);
    pool.release(&slot)?;
    ctx.runtime
        .remove(&slot)
        .with_context(|| format!("Claim released but removing '{}' failed", slot))?;
    ctx.trigger_replenish();

    Ok(FinishOutcome::OnHost {
        slot,
        work_item_id: id,
        pushed,
    })
}
