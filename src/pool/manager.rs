use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::state::{ClaimFile, ClaimRecord, Claims};
use crate::cmd::best_effort;
use crate::config::PoolConfig;
use crate::project::Project;
use crate::sandbox::SandboxRuntime;
use crate::store::StateStore;

/// Outcome of a replenish pass. Replenishing never fails as a whole.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplenishReport {
    pub created: Vec<String>,
    pub errors: Vec<String>,
    /// Claims dropped because their sandbox no longer exists
    pub pruned: Vec<String>,
}

impl ReplenishReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A fixed-size pool of sandboxes named `<prefix><index>`, cloned from a template.
///
/// Sandbox existence always comes from the runtime; the claim file only says
/// who holds which slot.
pub struct PoolManager<'a> {
    runtime: &'a dyn SandboxRuntime,
    claims: ClaimFile<'a>,
    prefix: String,
    template: String,
    image: String,
    size: usize,
    max_index: usize,
    init_command: Vec<String>,
}

impl<'a> PoolManager<'a> {
    pub fn new(
        runtime: &'a dyn SandboxRuntime,
        store: &'a dyn StateStore,
        project: &Project,
        config: &PoolConfig,
    ) -> Self {
        Self {
            runtime,
            claims: ClaimFile::new(store, project.pool_state_file()),
            prefix: config.prefix(&project.name),
            template: config.template(&project.name),
            image: config.image(&project.name),
            size: config.size(),
            max_index: config.size() * config.scan_multiplier(),
            init_command: config.init_command(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn slot_name(&self, index: usize) -> String {
        format!("{}{}", self.prefix, index)
    }

    /// Index of a pool slot name, if it names one within the scanned range.
    pub fn slot_index(&self, name: &str) -> Option<usize> {
        let index: usize = name.strip_prefix(&self.prefix)?.parse().ok()?;
        // Reject forms like "07" that parse but are not how slots are named
        (index < self.max_index && self.slot_name(index) == name).then_some(index)
    }

    pub fn is_slot(&self, name: &str) -> bool {
        self.slot_index(name).is_some()
    }

    pub fn claims(&self) -> Result<Claims> {
        self.claims.load()
    }

    /// Existing pool slots by index.
    fn existing_slots(&self) -> Result<BTreeMap<usize, String>> {
        Ok(self
            .runtime
            .list_containers(&self.prefix)?
            .into_iter()
            .filter_map(|c| self.slot_index(&c.name).map(|i| (i, c.name)))
            .collect())
    }

    /// Slots that exist and carry no claim, lowest index first.
    pub fn list_available(&self) -> Result<Vec<String>> {
        let claims = self.claims.load()?;
        Ok(self
            .existing_slots()?
            .into_values()
            .filter(|name| !claims.contains_key(name))
            .collect())
    }

    /// Claim the lowest available slot for a work item.
    pub fn claim(&self, work_item_id: &str, branch: &str) -> Result<Option<String>> {
        let Some(slot) = self.list_available()?.into_iter().next() else {
            info!(work_item = work_item_id, "pool:no available slot");
            return Ok(None);
        };
        self.record_claim(&slot, work_item_id, branch)?;
        Ok(Some(slot))
    }

    /// Write a claim for `slot` regardless of how it was obtained.
    pub fn record_claim(&self, slot: &str, work_item_id: &str, branch: &str) -> Result<()> {
        let mut claims = self.claims.load()?;
        if let Some(previous) = claims.insert(slot.to_string(), ClaimRecord::new(work_item_id, branch))
        {
            warn!(
                slot,
                previous = %previous.work_item_id,
                work_item = work_item_id,
                "pool:replacing existing claim"
            );
        }
        self.claims.save(&claims)?;
        info!(slot, work_item = work_item_id, branch, "pool:claimed");
        Ok(())
    }

    /// Drop the claim on `slot`; `"*"` drops every claim. Returns whether anything changed.
    pub fn release(&self, slot: &str) -> Result<bool> {
        let mut claims = self.claims.load()?;
        let changed = if slot == "*" {
            let had_any = !claims.is_empty();
            claims.clear();
            had_any
        } else {
            claims.remove(slot).is_some()
        };
        if changed {
            self.claims.save(&claims)?;
            info!(slot, "pool:released");
        } else {
            debug!(slot, "pool:release of unclaimed slot");
        }
        Ok(changed)
    }

    pub fn find_slot_for_work_item(&self, work_item_id: &str) -> Result<Option<String>> {
        Ok(self
            .claims
            .load()?
            .into_iter()
            .find(|(_, claim)| claim.work_item_id == work_item_id)
            .map(|(slot, _)| slot))
    }

    /// Up to `limit` indices with no sandbox at all, claimed or not, ascending.
    fn free_indices(&self, limit: usize) -> Result<Vec<usize>> {
        let existing: BTreeSet<usize> = self.existing_slots()?.into_keys().collect();
        Ok((0..self.max_index)
            .filter(|i| !existing.contains(i))
            .take(limit)
            .collect())
    }

    pub fn first_free_index(&self) -> Result<Option<usize>> {
        Ok(self.free_indices(1)?.into_iter().next())
    }

    /// Make sure the template exists and is stopped. Returns true if it had to be created.
    pub fn ensure_template(&self) -> Result<bool> {
        if self.runtime.container_exists(&self.template)? {
            best_effort("stop template", self.runtime.stop(&self.template));
            return Ok(false);
        }

        info!(template = %self.template, image = %self.image, "pool:creating template");
        self.runtime.create_from_image(&self.template, &self.image)?;
        if let Err(e) = self.runtime.exec(&self.template, &self.init_command) {
            best_effort("remove half-made template", self.runtime.remove(&self.template));
            return Err(e.context(format!("Failed to initialize template '{}'", self.template)));
        }
        self.runtime.stop(&self.template)?;
        Ok(true)
    }

    fn create_slot(&self, name: &str) -> Result<()> {
        self.runtime.clone_from(name, &self.template)?;
        self.runtime.exec(name, &self.init_command)?;
        self.runtime.stop(name)
    }

    /// Drop claims whose sandbox no longer exists.
    pub fn prune_stale_claims(&self) -> Result<Vec<String>> {
        let mut claims = self.claims.load()?;
        let mut pruned = Vec::new();
        for slot in claims.keys() {
            if !self.runtime.container_exists(slot)? {
                pruned.push(slot.clone());
            }
        }
        if pruned.is_empty() {
            return Ok(pruned);
        }
        for slot in &pruned {
            claims.remove(slot);
        }
        self.claims.save(&claims)?;
        info!(slots = ?pruned, "pool:pruned stale claims");
        Ok(pruned)
    }

    /// Bring the number of available slots up to the target size.
    pub fn replenish(&self) -> ReplenishReport {
        let mut report = ReplenishReport::default();

        match self.prune_stale_claims() {
            Ok(pruned) => report.pruned = pruned,
            Err(e) => report.errors.push(format!("Failed to reconcile claims: {:#}", e)),
        }

        let available = match self.list_available() {
            Ok(available) => available.len(),
            Err(e) => {
                report.errors.push(format!("Failed to list pool slots: {:#}", e));
                return report;
            }
        };
        if available >= self.size {
            debug!(available, target = self.size, "pool:at target");
            return report;
        }
        let deficit = self.size - available;

        let free = match self.free_indices(deficit) {
            Ok(free) => free,
            Err(e) => {
                report.errors.push(format!("Failed to scan pool slots: {:#}", e));
                return report;
            }
        };
        if free.is_empty() {
            report.errors.push(format!(
                "No free pool slots available: all {} indices under '{}' are taken. \
                 Finish or remove existing sessions, or raise pool.scan_multiplier.",
                self.max_index, self.prefix
            ));
            return report;
        }

        if let Err(e) = self.ensure_template() {
            report.errors.push(format!("{:#}", e));
            return report;
        }

        info!(available, deficit, indices = ?free, "pool:replenishing");
        for index in free {
            let name = self.slot_name(index);
            match self.create_slot(&name) {
                Ok(()) => {
                    info!(slot = %name, "pool:slot ready");
                    report.created.push(name);
                }
                Err(e) => {
                    warn!(slot = %name, error = %format!("{:#}", e), "pool:slot creation failed");
                    best_effort("remove failed slot", self.runtime.remove(&name));
                    report.errors.push(format!("{}: {:#}", name, e));
                }
            }
        }
        report
    }
}
