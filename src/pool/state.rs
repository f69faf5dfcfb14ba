//! Persisted claim records: `pool-state.json`, slot name -> claim.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use crate::store::StateStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub work_item_id: String,
    pub branch: String,
    pub claimed_at: DateTime<Utc>,
}

impl ClaimRecord {
    pub fn new(work_item_id: &str, branch: &str) -> Self {
        Self {
            work_item_id: work_item_id.to_string(),
            branch: branch.to_string(),
            claimed_at: Utc::now(),
        }
    }
}

/// All claims, keyed by slot name.
pub type Claims = BTreeMap<String, ClaimRecord>;

/// Loads and saves the claim map through a [`StateStore`].
pub struct ClaimFile<'a> {
    store: &'a dyn StateStore,
    path: PathBuf,
}

impl<'a> ClaimFile<'a> {
    pub fn new(store: &'a dyn StateStore, path: PathBuf) -> Self {
        Self { store, path }
    }

    /// Current claims. A missing file means no claims.
    ///
    /// A corrupt file is logged and treated as empty; the next save rewrites it.
    pub fn load(&self) -> Result<Claims> {
        let Some(contents) = self.store.read(&self.path)? else {
            return Ok(Claims::new());
        };
        if contents.trim().is_empty() {
            return Ok(Claims::new());
        }
        match serde_json::from_str(&contents) {
            Ok(claims) => Ok(claims),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "pool:unreadable claim file, starting empty");
                Ok(Claims::new())
            }
        }
    }

    pub fn save(&self, claims: &Claims) -> Result<()> {
        let mut json =
            serde_json::to_string_pretty(claims).context("Failed to serialize pool state")?;
        json.push('\n');
        self.store.write(&self.path, &json)
    }
}
