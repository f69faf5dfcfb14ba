//! Exit codes shared with calling tooling and the error type that selects them.

/// Command completed (or the daemon is running).
pub const EXIT_OK: i32 = 0;
/// Operation failed.
pub const EXIT_FAILURE: i32 = 1;
/// Bad arguments, missing tools, unknown ids.
pub const EXIT_USAGE: i32 = 2;
/// The daemon is intentionally not running.
pub const EXIT_STOPPED: i32 = 3;

/// A configuration or usage problem detected before any side effect.
///
/// `main` maps this to [`EXIT_USAGE`]; every other error maps to [`EXIT_FAILURE`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

impl UsageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Pick the process exit code for an error that reached the top level.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<UsageError>().is_some() {
        EXIT_USAGE
    } else {
        EXIT_FAILURE
    }
}
