use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use super::branch::branch_name;
use super::context::WorkflowContext;
use crate::cmd::best_effort;
use crate::error::UsageError;
use crate::pool::PoolManager;
use crate::project::sanitize_name;
use crate::spinner::{notice, with_spinner};
use crate::template::{SetupScript, render_setup_script};
use crate::tracker::WorkItemUpdate;

pub struct StartOptions<'a> {
    pub work_item_id: &'a str,
    /// Agent recorded as assignee when the work item is marked in progress
    pub agent: Option<&'a str>,
}

/// Where the session's sandbox came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSource {
    /// A pre-warmed slot claimed from the pool
    Pool,
    /// Cloned on demand from the template because the pool was empty
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSession {
    pub slot: String,
    pub branch: String,
    pub source: SlotSource,
    /// Exit code of the interactive shell
    pub exit_code: i32,
}

/// Command that opens a login shell inside the sandbox.
fn interactive_shell() -> Vec<String> {
    ["sh", "-lc", r#"exec "${SHELL:-/bin/sh}" -l"#]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Refuse before doing anything if the work item already has a sandbox.
fn check_no_existing_session(ctx: &WorkflowContext, pool: &PoolManager, id: &str) -> Result<()> {
    if let Some(slot) = pool.find_slot_for_work_item(id)? {
        return Err(UsageError::new(format!(
            "Work item '{}' already has a session in '{}'. Finish it first: devpool finish-work {}",
            id, slot, id
        ))
        .into());
    }

    let legacy = format!(
        "{}{}",
        ctx.config.sandbox.legacy_prefix(&ctx.project.name),
        sanitize_name(id)
    );
    if legacy != pool.template() && !pool.is_slot(&legacy) && ctx.runtime.container_exists(&legacy)? {
        return Err(UsageError::new(format!(
            "A sandbox from an older devpool version exists for '{}'. Remove it first: {} rm --force {}",
            id,
            ctx.config.sandbox.integration(),
            legacy
        ))
        .into());
    }
    Ok(())
}

fn ensure_image(ctx: &WorkflowContext, pool: &PoolManager) -> Result<()> {
    let image = pool.image();
    if ctx.runtime.image_exists(image)? {
        return Ok(());
    }
    let dockerfile = ctx.project.root.join(ctx.config.pool.dockerfile());
    if !dockerfile.exists() {
        return Err(UsageError::new(format!(
            "Base image '{}' not found and there is no {} to build it from. \
             Add one or set pool.image in .devpool.yaml",
            image,
            dockerfile.display()
        ))
        .into());
    }
    with_spinner(&format!("Building base image '{}'", image), || {
        ctx.runtime.build_image(image, &dockerfile, &ctx.project.root)
    })
}

fn ensure_template(ctx: &WorkflowContext, pool: &PoolManager) -> Result<()> {
    if ctx.runtime.container_exists(pool.template())? {
        pool.ensure_template()?;
        return Ok(());
    }
    notice(&format!(
        "First run: creating template sandbox '{}'. This is slow once; later sessions reuse it.",
        pool.template()
    ));
    with_spinner("Creating template sandbox", || pool.ensure_template().map(|_| ()))
}

/// Clone the template straight into the lowest free slot and claim it.
fn acquire_fallback_slot(
    ctx: &WorkflowContext,
    pool: &PoolManager,
    id: &str,
    branch: &str,
) -> Result<String> {
    notice("No pre-warmed sandbox available; cloning one from the template (slower).");
    let index = pool.first_free_index()?.ok_or_else(|| {
        anyhow!(
            "No free pool slots available under '{}'. Finish an existing session first.",
            pool.prefix()
        )
    })?;
    let slot = pool.slot_name(index);
    with_spinner(&format!("Cloning '{}'", slot), || {
        ctx.runtime.clone_from(&slot, pool.template())
    })
    .inspect_err(|_| {
        best_effort("remove partial clone", ctx.runtime.remove(&slot));
    })?;
    pool.record_claim(&slot, id, branch)?;
    Ok(slot)
}

/// Start a work session: validate, acquire a sandbox, set it up and attach.
pub fn start(ctx: &WorkflowContext, options: &StartOptions) -> Result<StartedSession> {
    let id = options.work_item_id;
    let item = ctx.tracker.show(id).map_err(|e| {
        UsageError::new(format!("Work item '{}' could not be validated: {:#}", id, e))
    })?;
    info!(id, issue_type = %item.issue_type, "workflow:start validated");

    let pool = ctx.pool();
    check_no_existing_session(ctx, &pool, id)?;

    let origin = ctx
        .origin_url()
        .context("Could not determine the 'origin' remote of this project")?;

    ensure_image(ctx, &pool)?;
    ensure_template(ctx, &pool)?;

    let branch = branch_name(&item, &ctx.config.tracker);
    let (slot, source) = match pool.claim(id, &branch)? {
        Some(slot) => (slot, SlotSource::Pool),
        None => (
            acquire_fallback_slot(ctx, &pool, id, &branch)?,
            SlotSource::Fallback,
        ),
    };
    info!(id, slot = %slot, branch = %branch, ?source, "workflow:slot acquired");

    let workdir = ctx.workdir_for(&origin);
    let host_project = ctx.project.root.display().to_string();
    let script = render_setup_script(
        &ctx.templates,
        &SetupScript {
            sandbox: &slot,
            work_item_id: id,
            branch: &branch,
            origin_url: &origin,
            workdir: &workdir,
            host_project: &host_project,
            tracker: ctx.config.tracker.binary(),
        },
    )?;
    let setup = with_spinner(&format!("Setting up '{}' on {}", slot, branch), || {
        ctx.runtime
            .exec(&slot, &["sh".to_string(), "-c".to_string(), script])
    });
    if let Err(e) = setup {
        warn!(slot = %slot, error = %format!("{:#}", e), "workflow:setup failed, cleaning up");
        best_effort("release claim", pool.release(&slot).map(|_| ()));
        best_effort("remove sandbox", ctx.runtime.remove(&slot));
        return Err(e.context(format!(
            "Setup of '{}' failed; the claim was released and the sandbox removed",
            slot
        )));
    }

    if let Some(agent) = options.agent {
        best_effort(
            "mark work item in progress",
            ctx.tracker.update(id, &WorkItemUpdate::in_progress(agent)),
        );
    }

    ctx.trigger_replenish();

    println!(
        "Session for '{}' ({}) ready in '{}' on branch {}",
        id, item.title, slot, branch
    );
    let exit_code = ctx.runtime.enter_interactive(&slot, &interactive_shell())?;
    Ok(StartedSession {
        slot,
        branch,
        source,
        exit_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{EXIT_USAGE, exit_code_for};
    use crate::sandbox::fake::FakeRuntime;
    use crate::store::MemoryStore;
    use crate::tracker::fake::FakeTracker;
    use crate::workflow::context::testing;
    use crate::workflow::WorkflowContext;

    struct Fixture {
        project: crate::project::Project,
        config: Config,
        runtime: FakeRuntime,
        tracker: FakeTracker,
        store: MemoryStore,
    }

    impl Fixture {
        fn new(containers: &[&str]) -> Self {
            let runtime = FakeRuntime::with_containers(containers.iter().copied());
            runtime.add_image("acme-base");
            runtime.set_interactive_exit(0);
            Self {
                project: testing::project(),
                config: Config::default(),
                runtime,
                tracker: FakeTracker::with_item("wi-1", "bug"),
                store: MemoryStore::new(),
            }
        }

        fn ctx(&self) -> WorkflowContext<'_> {
            WorkflowContext::new(
                &self.project,
                &self.config,
                &self.runtime,
                &self.tracker,
                &self.store,
                testing::hooks(),
            )
        }
    }

    fn options(id: &str) -> StartOptions<'_> {
        StartOptions {
            work_item_id: id,
            agent: None,
        }
    }

    #[test]
    fn test_start_claims_pool_slot_and_attaches() {
        let fx = Fixture::new(&["acme-template", "acme-slot-0", "acme-slot-1"]);
        fx.runtime.set_interactive_exit(4);
        let ctx = fx.ctx();

        let session = start(&ctx, &options("wi-1")).unwrap();
        assert_eq!(
            session,
            StartedSession {
                slot: "acme-slot-0".to_string(),
                branch: "fix/wi-1".to_string(),
                source: SlotSource::Pool,
                exit_code: 4,
            }
        );
        let claims = ctx.pool().claims().unwrap();
        assert_eq!(claims["acme-slot-0"].branch, "fix/wi-1");

        let calls = fx.runtime.calls();
        let setup = calls
            .iter()
            .find(|c| c.starts_with("exec acme-slot-0: sh -c"))
            .expect("setup script ran");
        assert!(setup.contains("export DEVPOOL_SANDBOX='acme-slot-0'"));
        assert!(setup.contains("/workspace/widgets"));
        assert!(calls.last().unwrap().starts_with("enter acme-slot-0"));
        assert_eq!(testing::replenish_calls(), 1);
    }

    #[test]
    fn test_start_falls_back_to_cloning_template() {
        let fx = Fixture::new(&["acme-template"]);
        let ctx = fx.ctx();

        let session = start(&ctx, &options("wi-1")).unwrap();
        assert_eq!(session.slot, "acme-slot-0");
        assert_eq!(session.source, SlotSource::Fallback);
        assert_eq!(testing::replenish_calls(), 1);
        assert!(
            fx.runtime
                .calls()
                .contains(&"clone acme-slot-0 <- acme-template".to_string())
        );
        assert_eq!(
            ctx.pool().find_slot_for_work_item("wi-1").unwrap().as_deref(),
            Some("acme-slot-0")
        );
    }

    #[test]
    fn test_start_creates_template_on_first_run() {
        let fx = Fixture::new(&[]);
        let ctx = fx.ctx();

        start(&ctx, &options("wi-1")).unwrap();
        assert!(fx.runtime.has("acme-template"));
        assert!(!fx.runtime.is_running("acme-template"));
    }

    #[test]
    fn test_start_refuses_existing_session() {
        let fx = Fixture::new(&["acme-template", "acme-slot-0", "acme-slot-1"]);
        let ctx = fx.ctx();
        ctx.pool().record_claim("acme-slot-1", "wi-1", "fix/wi-1").unwrap();

        let err = start(&ctx, &options("wi-1")).unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_USAGE);
        assert!(err.to_string().contains("acme-slot-1"));
        assert!(err.to_string().contains("devpool finish-work wi-1"));
        assert!(fx.runtime.calls().is_empty());
        assert_eq!(testing::replenish_calls(), 0);
    }

    #[test]
    fn test_start_refuses_legacy_sandbox() {
        let fx = Fixture::new(&["acme-template", "acme-slot-0", "acme-wi-1"]);
        let ctx = fx.ctx();

        let err = start(&ctx, &options("wi-1")).unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_USAGE);
        assert!(err.to_string().contains("distrobox rm --force acme-wi-1"));
    }

    #[test]
    fn test_start_rejects_unknown_work_item() {
        let fx = Fixture::new(&["acme-template", "acme-slot-0"]);
        let ctx = fx.ctx();

        let err = start(&ctx, &options("wi-404")).unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_USAGE);
        assert!(ctx.pool().claims().unwrap().is_empty());
    }

    #[test]
    fn test_setup_failure_after_fresh_clone_cleans_up() {
        let fx = Fixture::new(&["acme-template"]);
        fx.runtime.fail_exec_in("acme-slot-0");
        let ctx = fx.ctx();

        let err = start(&ctx, &options("wi-1")).unwrap_err();
        assert!(err.to_string().contains("claim was released"));
        assert!(!fx.runtime.has("acme-slot-0"));
        assert!(ctx.pool().claims().unwrap().is_empty());
        assert!(!fx.runtime.calls().iter().any(|c| c.starts_with("enter")));
        assert_eq!(testing::replenish_calls(), 0);
    }

    #[test]
    fn test_setup_failure_on_pool_slot_cleans_up() {
        let fx = Fixture::new(&["acme-template", "acme-slot-0"]);
        fx.runtime.fail_exec_in("acme-slot-0");
        let ctx = fx.ctx();

        assert!(start(&ctx, &options("wi-1")).is_err());
        assert!(!fx.runtime.has("acme-slot-0"));
        assert!(ctx.pool().find_slot_for_work_item("wi-1").unwrap().is_none());
    }

    #[test]
    fn test_agent_marks_item_in_progress() {
        let fx = Fixture::new(&["acme-template", "acme-slot-0"]);
        let ctx = fx.ctx();

        start(
            &ctx,
            &StartOptions {
                work_item_id: "wi-1",
                agent: Some("agent-7"),
            },
        )
        .unwrap();
        let updates = fx.tracker.updates.borrow();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, WorkItemUpdate::in_progress("agent-7"));
    }

    #[test]
    fn test_missing_image_without_containerfile_is_usage_error() {
        let fx = Fixture {
            runtime: FakeRuntime::with_containers(["acme-template", "acme-slot-0"]),
            ..Fixture::new(&[])
        };
        let ctx = fx.ctx();

        let err = start(&ctx, &options("wi-1")).unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_USAGE);
        assert!(err.to_string().contains("acme-base"));
        assert!(ctx.pool().claims().unwrap().is_empty());
    }
}
