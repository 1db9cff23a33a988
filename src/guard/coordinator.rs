//! The guard loop: poll keys, detect chords, run challenges
//!
//! Polling is suspended while a chord is being handled, so an open
//! challenge can never be re-entered by a second chord.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::events::GuardEvent;
use crate::hotkey::{ChordDetector, ChordEvent, KeySampler, POLL_INTERVAL};
use crate::lockout::EventLog;
use crate::revocation::RemoteApi;

use super::challenge::ChallengePrompt;
use super::context::GuardContext;

/// Pause after handling a chord before polling resumes
pub const CHORD_COOLDOWN: Duration = Duration::from_millis(500);

/// Drives chord detection and the challenge flow
pub struct Guard {
    ctx: GuardContext,
    detector: ChordDetector,
    prompt: Arc<dyn ChallengePrompt>,
    api: Arc<dyn RemoteApi>,
    request_log: EventLog,
    cooldown: Duration,
}

impl Guard {
    pub fn new(
        ctx: GuardContext,
        prompt: Arc<dyn ChallengePrompt>,
        api: Arc<dyn RemoteApi>,
        request_log: EventLog,
    ) -> Self {
        Self {
            ctx,
            detector: ChordDetector::new(),
            prompt,
            api,
            request_log,
            cooldown: CHORD_COOLDOWN,
        }
    }

    /// Override the post-chord pause
    #[cfg(test)]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Poll `sampler` until the task is dropped
    pub async fn run(&mut self, mut sampler: Box<dyn KeySampler>) {
        if !sampler.is_live() {
            warn!("no live key sampler, chord detection disabled");
            std::future::pending::<()>().await;
        }

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = POLL_INTERVAL.as_millis() as u64, "chord polling started");

        loop {
            ticker.tick().await;
            let keys = sampler.sample();

            if let Some(event) = self.detector.observe(keys, Instant::now()) {
                self.handle(event).await;
                tokio::time::sleep(self.cooldown).await;
                self.detector.reset();
                ticker.reset();
            }
        }
    }

    /// React to one completed chord
    pub async fn handle(&mut self, event: ChordEvent) {
        info!(?event, "chord detected");
        match event {
            ChordEvent::ShowChallenge => self.run_challenge().await,
            ChordEvent::ToggleVisibility => {
                self.ctx.toggle_tray().await;
            }
        }
    }

    async fn run_challenge(&mut self) {
        let status = {
            let mut policy = self.ctx.policy.lock().await;
            if policy.is_locked() {
                let status = policy.status_message();
                info!("challenge refused during lockdown");
                self.ctx.emit(GuardEvent::LockdownActive { status });
                return;
            }
            policy.status_message()
        };

        let code = match self.prompt.prompt(&status).await {
            Some(code) if !code.is_empty() => code,
            _ => {
                debug!("no code entered");
                self.ctx.emit(GuardEvent::ChallengeCancelled);
                return;
            }
        };

        let valid = self.ctx.settings.read().await.verify_code(&code);
        if valid {
            self.ctx.policy.lock().await.record_success();
            info!("challenge passed");
            self.ctx.emit(GuardEvent::ChallengeSucceeded);
            self.spawn_heartbeat();
            return;
        }

        let mut policy = self.ctx.policy.lock().await;
        let breach = policy.record_failure(&code);
        let status = policy.status_message();
        let event = match (breach, policy.lockdown_until()) {
            (true, Some(lockdown_until)) => GuardEvent::SecurityBreach {
                lockdown_until,
                status,
            },
            _ => GuardEvent::ChallengeFailed {
                failed_attempts: policy.failed_attempts(),
                status,
            },
        };
        drop(policy);
        self.ctx.emit(event);
    }

    /// Notify the backend of a successful challenge without blocking polling
    fn spawn_heartbeat(&self) {
        let api = Arc::clone(&self.api);
        let log = self.request_log.clone();
        tokio::spawn(async move {
            match api.heartbeat().await {
                Ok(response) => {
                    debug!(status = response.status, "heartbeat sent");
                    log.record(format!("{} - {}", response.status, response.body));
                }
                Err(e) => {
                    warn!(error = %e, "heartbeat failed");
                    log.record(format!("ERROR: {}", e));
                }
            }
        });
    }
}
