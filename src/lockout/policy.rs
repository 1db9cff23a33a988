//! Brute-force lockout policy
//!
//! Two states, `Normal` and `Locked`. Three consecutive failures lock the
//! guard for thirty minutes. Unlocking happens lazily: the first
//! `is_locked` call at or past the deadline performs the transition.
//! Every mutation is persisted before anything else observes it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::events::GuardEvent;

use super::audit::EventLog;
use super::state::{mask_code, LockoutState, Normalization};
use super::store::StateStore;

/// Consecutive failures that trigger a lockdown
pub const MAX_FAILED_ATTEMPTS: u32 = 3;

/// Length of a lockdown, in minutes
pub const LOCKDOWN_MINUTES: i64 = 30;

/// Callback invoked once per `Normal -> Locked` transition
pub trait LockoutListener: Send + Sync {
    /// Called after the locked state has been persisted
    fn lockout_triggered(&self, failed_attempts: u32);
}

/// Owner of the lockout state
pub struct LockoutPolicy {
    state: LockoutState,
    clock: Arc<dyn Clock>,
    store: StateStore,
    log: EventLog,
    listener: Option<Arc<dyn LockoutListener>>,
    event_tx: Option<broadcast::Sender<GuardEvent>>,
}

impl LockoutPolicy {
    /// Restore the policy from `store`, lifting a lockdown that already expired
    pub fn restore(store: StateStore, log: EventLog, clock: Arc<dyn Clock>) -> Self {
        let mut state = store.load();
        let normalization = state.normalize(clock.now());

        let policy = Self {
            state,
            clock,
            store,
            log,
            listener: None,
            event_tx: None,
        };

        match normalization {
            Normalization::Unchanged => {}
            Normalization::Expired => {
                info!("stored lockdown already expired, unlocking");
                policy.log.record("Security lockdown expired - system unlocked");
                policy.persist();
            }
            Normalization::Repaired => {
                warn!("inconsistent security state on disk, repaired");
                policy.persist();
            }
        }

        info!(
            failed_attempts = policy.state.failed_attempts,
            locked = policy.state.is_locked,
            "security state restored"
        );
        policy
    }

    /// Register the lockout callback
    pub fn with_listener(mut self, listener: Arc<dyn LockoutListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Broadcast lockout transitions on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<GuardEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Current snapshot
    #[cfg(test)]
    pub fn state(&self) -> LockoutState {
        self.state
    }

    pub fn failed_attempts(&self) -> u32 {
        self.state.failed_attempts
    }

    /// Lockdown deadline, if one is set
    pub fn lockdown_until(&self) -> Option<DateTime<Utc>> {
        self.state.lockdown_until
    }

    /// Clear the failure counter after a correct code
    pub fn record_success(&mut self) {
        if self.state.failed_attempts == 0 {
            return;
        }

        info!(
            failed_attempts = self.state.failed_attempts,
            "authentication succeeded, resetting failure count"
        );
        self.log.record(format!(
            "2FA successful after {} failed attempts",
            self.state.failed_attempts
        ));
        self.state.failed_attempts = 0;
        self.persist();
    }

    /// Count a wrong code. Returns true iff this call started a lockdown.
    pub fn record_failure(&mut self, attempted_code: &str) -> bool {
        self.state.failed_attempts = self.state.failed_attempts.saturating_add(1);
        let attempts = self.state.failed_attempts;

        warn!(failed_attempts = attempts, "authentication failed");
        self.log.record(format!(
            "2FA failed attempt #{} - Code: {}",
            attempts,
            mask_code(attempted_code)
        ));
        self.persist();

        if attempts < MAX_FAILED_ATTEMPTS || self.state.is_locked {
            return false;
        }

        let until = self.clock.now() + Duration::minutes(LOCKDOWN_MINUTES);
        self.state.is_locked = true;
        self.state.lockdown_until = Some(until);

        warn!(failed_attempts = attempts, lockdown_until = %until, "security breach, lockdown activated");
        self.log.record(format!(
            "SECURITY BREACH! Lockdown activated until {}",
            until.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        ));
        self.persist();

        if let Some(listener) = &self.listener {
            listener.lockout_triggered(attempts);
        }
        true
    }

    /// Whether authentication is currently refused; lifts an expired lockdown
    pub fn is_locked(&mut self) -> bool {
        if self.state.is_expired(self.clock.now()) {
            self.unlock();
            return false;
        }
        self.state.is_locked
    }

    /// Time left in the current lockdown
    pub fn time_remaining(&self) -> Option<std::time::Duration> {
        remaining(&self.state, self.clock.now())
    }

    /// One-line summary for notifications and prompts
    pub fn status_message(&self) -> String {
        format_status(&self.state, self.clock.now())
    }

    /// Clear attempts and any lockdown on operator request
    pub fn reset(&mut self) {
        info!(previous = ?self.state, "security state reset by operator");
        self.log.record("Security state reset by operator");
        self.state = LockoutState::default();
        self.persist();
        self.emit(GuardEvent::SecurityReset);
    }

    fn unlock(&mut self) {
        self.state = LockoutState::default();
        info!("security lockdown expired, unlocked");
        self.log.record("Security lockdown expired - system unlocked");
        self.persist();
        self.emit(GuardEvent::LockdownExpired);
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            warn!(error = %e, "failed to persist security state, continuing in memory");
        }
    }

    fn emit(&self, event: GuardEvent) {
        if let Some(tx) = &self.event_tx {
            debug!(%event, "emitting lockout event");
            let _ = tx.send(event);
        }
    }
}

/// Positive time left until the deadline at `now`
fn remaining(state: &LockoutState, now: DateTime<Utc>) -> Option<std::time::Duration> {
    let until = state.lockdown_until?;
    (until - now).to_std().ok().filter(|d| !d.is_zero())
}

/// Status text derived from the snapshot alone
pub fn format_status(state: &LockoutState, now: DateTime<Utc>) -> String {
    if state.is_locked {
        if let Some(left) = remaining(state, now) {
            let secs = left.as_secs();
            return format!(
                "Locked after {} failed 2FA attempts. Unlocks in {}m {}s",
                MAX_FAILED_ATTEMPTS,
                secs / 60,
                secs % 60
            );
        }
        return "Security normal".to_string();
    }

    if state.failed_attempts > 0 {
        return format!(
            "{}/{} failed 2FA attempts",
            state.failed_attempts, MAX_FAILED_ATTEMPTS
        );
    }

    "Security normal".to_string()
}
