//! The pre-warmed sandbox pool: slots, claims and replenishment.

mod background;
mod manager;
mod state;

pub use background::{REPLENISH_SUBCOMMAND, replenish_in_background};
pub use manager::{PoolManager, ReplenishReport};
pub use state::Claims;
