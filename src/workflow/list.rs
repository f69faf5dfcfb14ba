use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::context::WorkflowContext;
use crate::pool::{Claims, PoolManager};

/// A project sandbox in use: a claimed pool slot or a legacy per-item sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub sandbox: String,
    pub status: String,
    pub work_item_id: Option<String>,
    pub branch: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Another pool's plumbing seen through the legacy prefix, e.g. `api-slot-0`
/// or `api-template` when a project `acme-api` lives next to `acme`.
static POOL_ARTIFACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|-)(slot-\d+|template)$").unwrap());

/// Whether a runtime sandbox holds a work session of this project.
///
/// Under the pool prefix only claimed slots within the scan range count.
/// Under the legacy prefix everything counts except other pools' slots and
/// templates.
fn is_session(name: &str, pool: &PoolManager, legacy_prefix: &str, claims: &Claims) -> bool {
    if name == pool.template() {
        return false;
    }
    if name.starts_with(pool.prefix()) {
        return pool.is_slot(name) && claims.contains_key(name);
    }
    name.strip_prefix(legacy_prefix)
        .is_some_and(|rest| !rest.is_empty() && !POOL_ARTIFACT_RE.is_match(rest))
}

/// Project sandboxes annotated with their claims.
///
/// The template and idle pool slots are plumbing, not sessions, and are left out.
pub fn list_sessions(ctx: &WorkflowContext) -> Result<Vec<SessionInfo>> {
    let pool = ctx.pool();
    let claims = pool.claims()?;
    let legacy_prefix = ctx.config.sandbox.legacy_prefix(&ctx.project.name);

    let mut containers = BTreeMap::new();
    for prefix in [pool.prefix(), legacy_prefix.as_str()] {
        for container in ctx.runtime.list_containers(prefix)? {
            containers.insert(container.name.clone(), container);
        }
    }

    Ok(containers
        .into_values()
        .filter(|c| is_session(&c.name, &pool, &legacy_prefix, &claims))
        .map(|c| {
            let claim = claims.get(&c.name);
            SessionInfo {
                work_item_id: claim.map(|cl| cl.work_item_id.clone()),
                branch: claim.map(|cl| cl.branch.clone()),
                claimed_at: claim.map(|cl| cl.claimed_at),
                sandbox: c.name,
                status: c.status,
            }
        })
        .collect())
}
