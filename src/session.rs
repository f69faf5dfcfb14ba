//! Session identity inside a sandbox.
//!
//! The setup script exports these variables from the sandbox shell hook, so
//! a devpool invoked from inside a session knows where it is running.

use std::path::PathBuf;

pub const ENV_SANDBOX: &str = "DEVPOOL_SANDBOX";
pub const ENV_WORK_ITEM: &str = "DEVPOOL_WORK_ITEM";
pub const ENV_BRANCH: &str = "DEVPOOL_BRANCH";
pub const ENV_HOST_PROJECT: &str = "DEVPOOL_HOST_PROJECT";
/// Checkout directory inside the sandbox; optional
pub const ENV_WORKDIR: &str = "DEVPOOL_WORKDIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub sandbox: String,
    pub work_item_id: String,
    pub branch: String,
    /// Project root on the host, where the pool state lives
    pub host_project: PathBuf,
    pub workdir: Option<PathBuf>,
}

impl SessionIdentity {
    /// Identity of the current process, if it runs inside a work session.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// The four identity variables must be present and non-empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Some(Self {
            sandbox: get(ENV_SANDBOX)?,
            work_item_id: get(ENV_WORK_ITEM)?,
            branch: get(ENV_BRANCH)?,
            host_project: PathBuf::from(get(ENV_HOST_PROJECT)?),
            workdir: get(ENV_WORKDIR).map(PathBuf::from),
        })
    }
}
