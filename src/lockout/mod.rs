//! Lockout module for brute-force protection
//!
//! Tracks failed code attempts, enforces a timed lockdown after repeated
//! failures, and persists the state across restarts:
//! - `LockoutPolicy`: the Normal/Locked state machine
//! - `StateStore`: JSON snapshot of the policy state
//! - `EventLog`: append-only audit trail

mod audit;
mod policy;
mod state;
mod store;

pub use audit::EventLog;
pub use policy::{LockoutListener, LockoutPolicy};
pub use store::StateStore;

#[cfg(test)]
pub(crate) use audit::read_lines;
#[cfg(test)]
pub(crate) use state::LockoutState;
