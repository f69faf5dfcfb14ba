//! Shell scripts run inside sandboxes, rendered with minijinja.
//!
//! Every interpolated value goes through the `shquote` filter so work item
//! ids, branch names and URLs can never break out of their argument.

use anyhow::{Context, Result};
use minijinja::{AutoEscape, Environment};
use serde::Serialize;

use crate::session;

const SETUP_TEMPLATE: &str = include_str!("scripts/setup.sh.j2");
const SYNC_TEMPLATE: &str = include_str!("scripts/sync.sh.j2");

pub type TemplateEnv = Environment<'static>;

/// Create and configure the template environment with filters and escape settings.
pub fn create_template_env() -> TemplateEnv {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);
    env.add_filter("shquote", shquote_filter);
    env
}

/// Values for the one-time session setup script.
#[derive(Debug, Serialize)]
pub struct SetupScript<'a> {
    pub sandbox: &'a str,
    pub work_item_id: &'a str,
    pub branch: &'a str,
    pub origin_url: &'a str,
    pub workdir: &'a str,
    pub host_project: &'a str,
    pub tracker: &'a str,
}

/// Values for the commit-and-push script.
#[derive(Debug, Serialize)]
pub struct SyncScript<'a> {
    pub workdir: &'a str,
    pub branch: &'a str,
    pub message: &'a str,
}

#[derive(Serialize)]
struct SetupContext<'a> {
    #[serde(flatten)]
    script: &'a SetupScript<'a>,
    prompt: String,
    env_sandbox: &'static str,
    env_work_item: &'static str,
    env_branch: &'static str,
    env_host_project: &'static str,
    env_workdir: &'static str,
}

pub fn render_setup_script(env: &TemplateEnv, script: &SetupScript) -> Result<String> {
    let context = SetupContext {
        script,
        prompt: format!("[devpool {}] \\w \\$ ", script.work_item_id),
        env_sandbox: session::ENV_SANDBOX,
        env_work_item: session::ENV_WORK_ITEM,
        env_branch: session::ENV_BRANCH,
        env_host_project: session::ENV_HOST_PROJECT,
        env_workdir: session::ENV_WORKDIR,
    };
    env.render_str(SETUP_TEMPLATE, &context)
        .context("Failed to render sandbox setup script")
}

pub fn render_sync_script(env: &TemplateEnv, script: &SyncScript) -> Result<String> {
    env.render_str(SYNC_TEMPLATE, script)
        .context("Failed to render commit/push script")
}

/// Quote a value for POSIX sh as a single word.
pub fn shquote(input: &str) -> String {
    format!("'{}'", input.replace('\'', r"'\''"))
}

fn shquote_filter(input: String) -> String {
    shquote(&input)
}
