//! Revocation module for remote code invalidation
//!
//! On lockout the active code is revoked on the backend and a new one is
//! requested. Calls are best-effort and never affect the lockout decision.

mod api;
mod coordinator;

pub use api::{HttpRemoteApi, RemoteApi, UnconfiguredApi};
pub use coordinator::RevocationCoordinator;

#[cfg(test)]
pub(crate) use api::testing;
