// Module declarations
mod branch;
mod context;
mod finish;
mod list;
mod start;

// Public API re-exports
pub use context::{Hooks, WorkflowContext};
pub use finish::{FinishOptions, FinishOutcome, finish};
pub use list::{SessionInfo, list_sessions};
pub use start::{SlotSource, StartOptions, start};
