//! Remote revocation after a lockout
//!
//! Each `Normal -> Locked` transition spawns one revocation task: revoke the
//! active code, and on success request a new one. Failures are logged and
//! swallowed; the lockout itself is already committed when the task starts.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::events::GuardEvent;
use crate::lockout::{EventLog, LockoutListener};

use super::api::{RemoteApi, RevokeRequest};

/// Result of one revocation sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationOutcome {
    pub revoked: bool,
    pub detail: String,
}

/// Runs the revoke/regenerate sequence
#[derive(Clone)]
struct Revoker {
    api: Arc<dyn RemoteApi>,
    log: EventLog,
    clock: Arc<dyn Clock>,
    client_identity: String,
    event_tx: Option<broadcast::Sender<GuardEvent>>,
}

impl Revoker {
    async fn run(self, failed_attempts: u32) -> RevocationOutcome {
        let request =
            RevokeRequest::security_breach(failed_attempts, self.clock.now(), &self.client_identity);

        let outcome = match self.api.revoke(&request).await {
            Ok(response) => {
                self.log
                    .record(format!("Revoke request sent - Status: {}", response.status));
                if response.is_success() {
                    info!(status = response.status, "2FA code revoked on server");
                    self.log.record("2FA code revoked successfully on server");
                    let regenerated = self.regenerate().await;
                    RevocationOutcome {
                        revoked: true,
                        detail: format!("revoked (status {}); {}", response.status, regenerated),
                    }
                } else {
                    warn!(status = response.status, "server refused 2FA revocation");
                    self.log.record("Failed to revoke 2FA code on server");
                    RevocationOutcome {
                        revoked: false,
                        detail: format!("revoke rejected with status {}", response.status),
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "failed to reach server for 2FA revocation");
                self.log.record(format!("Error revoking 2FA: {}", e));
                self.log.record("Failed to revoke 2FA code on server");
                RevocationOutcome {
                    revoked: false,
                    detail: format!("revoke failed: {}", e),
                }
            }
        };

        if let Some(tx) = &self.event_tx {
            let _ = tx.send(GuardEvent::RevocationCompleted {
                revoked: outcome.revoked,
                detail: outcome.detail.clone(),
            });
        }
        outcome
    }

    /// Request a fresh code; returns a short description for the outcome
    async fn regenerate(&self) -> String {
        match self.api.generate_new_code().await {
            Ok(response) if response.is_success() => {
                info!(status = response.status, "new 2FA code generated on server");
                // The body may carry the new code; keep it out of the log
                self.log.record(format!(
                    "New 2FA code generated on server - Status: {}",
                    response.status
                ));
                "new code generated".to_string()
            }
            Ok(response) => {
                warn!(status = response.status, "server refused to generate a new 2FA code");
                self.log.record(format!(
                    "Failed to generate new 2FA code - Status: {}",
                    response.status
                ));
                format!("regeneration rejected with status {}", response.status)
            }
            Err(e) => {
                error!(error = %e, "failed to reach server for 2FA regeneration");
                self.log.record(format!("Error generating new 2FA: {}", e));
                format!("regeneration failed: {}", e)
            }
        }
    }
}

/// Spawns revocation tasks on lockout and tracks them until drained
pub struct RevocationCoordinator {
    revoker: Revoker,
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<RevocationOutcome>>>,
}

impl RevocationCoordinator {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        log: EventLog,
        clock: Arc<dyn Clock>,
        client_identity: impl Into<String>,
        runtime: Handle,
    ) -> Self {
        Self {
            revoker: Revoker {
                api,
                log,
                clock,
                client_identity: client_identity.into(),
                event_tx: None,
            },
            runtime,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Broadcast `RevocationCompleted` on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<GuardEvent>) -> Self {
        self.revoker.event_tx = Some(event_tx);
        self
    }

    /// Run one revocation sequence to completion
    #[cfg(test)]
    pub async fn on_lockout_triggered(&self, failed_attempts: u32) -> RevocationOutcome {
        self.revoker.clone().run(failed_attempts).await
    }

    /// Number of spawned tasks not yet drained
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Wait up to `timeout` for spawned tasks; returns the finished outcomes
    pub async fn drain(&self, timeout: Duration) -> Vec<RevocationOutcome> {
        let tasks: Vec<_> = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if tasks.is_empty() {
            return Vec::new();
        }

        info!(count = tasks.len(), "waiting for revocation tasks");
        let deadline = tokio::time::Instant::now() + timeout;
        let mut outcomes = Vec::with_capacity(tasks.len());

        for task in tasks {
            match tokio::time::timeout_at(deadline, task).await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => error!(error = %e, "revocation task failed"),
                Err(_) => {
                    warn!("revocation task still running at shutdown, abandoning");
                }
            }
        }
        outcomes
    }
}

impl LockoutListener for RevocationCoordinator {
    fn lockout_triggered(&self, failed_attempts: u32) {
        info!(failed_attempts, "lockout triggered, starting revocation");
        let task = self.runtime.spawn(self.revoker.clone().run(failed_attempts));

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}
