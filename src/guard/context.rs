//! State shared between the guard loop and the IPC server

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::info;

use crate::config::AppSettings;
use crate::events::GuardEvent;
use crate::lockout::LockoutPolicy;

use super::challenge::ChallengeBroker;

/// Hint shown after the tray icon is toggled
fn tray_hint(visible: bool) -> &'static str {
    if visible {
        "Tray icon shown"
    } else {
        "Tray icon hidden. Press Ctrl+K then Ctrl+T to show it again."
    }
}

/// Point-in-time view of the lockout for status queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuritySnapshot {
    pub locked: bool,
    pub failed_attempts: u32,
    pub seconds_remaining: Option<u64>,
    pub status_message: String,
}

/// Handles to the policy, settings and event channel
#[derive(Clone)]
pub struct GuardContext {
    pub policy: Arc<Mutex<LockoutPolicy>>,
    pub settings: Arc<RwLock<AppSettings>>,
    pub settings_path: PathBuf,
    pub broker: ChallengeBroker,
    pub event_tx: broadcast::Sender<GuardEvent>,
}

impl GuardContext {
    pub fn new(
        policy: LockoutPolicy,
        settings: AppSettings,
        settings_path: impl Into<PathBuf>,
        event_tx: broadcast::Sender<GuardEvent>,
    ) -> Self {
        Self {
            policy: Arc::new(Mutex::new(policy)),
            settings: Arc::new(RwLock::new(settings)),
            settings_path: settings_path.into(),
            broker: ChallengeBroker::new(),
            event_tx,
        }
    }

    /// Broadcast an event to subscribers; no subscribers is fine
    pub fn emit(&self, event: GuardEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Flip tray visibility, persist it, and announce it
    pub async fn toggle_tray(&self) -> bool {
        let visible = self
            .settings
            .write()
            .await
            .toggle_tray_icon(&self.settings_path);
        info!(visible, "tray icon visibility toggled");
        self.emit(GuardEvent::TrayVisibilityChanged {
            visible,
            hint: tray_hint(visible).to_string(),
        });
        visible
    }

    /// Current tray visibility
    pub async fn tray_visible(&self) -> bool {
        self.settings.read().await.show_tray_icon
    }

    /// Observe the lockout (applying any due unlock) and summarise it
    pub async fn security_snapshot(&self) -> SecuritySnapshot {
        let mut policy = self.policy.lock().await;
        let locked = policy.is_locked();
        SecuritySnapshot {
            locked,
            failed_attempts: policy.failed_attempts(),
            seconds_remaining: policy.time_remaining().map(|d| d.as_secs()),
            status_message: policy.status_message(),
        }
    }

    /// Operator reset of the lockout state
    pub async fn reset_security(&self) {
        self.policy.lock().await.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::clock::ManualClock;
    use crate::lockout::{EventLog, StateStore};

    fn context(dir: &std::path::Path) -> (GuardContext, broadcast::Receiver<GuardEvent>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let (tx, rx) = broadcast::channel(16);
        let policy = LockoutPolicy::restore(
            StateStore::new(dir.join("security_state.json")),
            EventLog::new(dir.join("security.log"), clock.clone()),
            clock,
        )
        .with_events(tx.clone());
        let ctx = GuardContext::new(policy, AppSettings::default(), dir.join("config.json"), tx);
        (ctx, rx)
    }

    #[tokio::test]
    async fn test_toggle_tray_announces() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, mut rx) = context(dir.path());

        assert!(!ctx.toggle_tray().await);
        assert!(!ctx.tray_visible().await);
        match rx.recv().await.unwrap() {
            GuardEvent::TrayVisibilityChanged { visible, hint } => {
                assert!(!visible);
                assert!(hint.contains("Ctrl+K"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!AppSettings::load(&ctx.settings_path).show_tray_icon);
    }

    #[tokio::test]
    async fn test_security_snapshot_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, mut rx) = context(dir.path());

        {
            let mut policy = ctx.policy.lock().await;
            for code in ["1", "2", "3"] {
                policy.record_failure(code);
            }
        }

        let snapshot = ctx.security_snapshot().await;
        assert!(snapshot.locked);
        assert_eq!(snapshot.failed_attempts, 3);
        assert_eq!(snapshot.seconds_remaining, Some(1800));

        ctx.reset_security().await;
        assert_eq!(rx.recv().await.unwrap(), GuardEvent::SecurityReset);
        let snapshot = ctx.security_snapshot().await;
        assert!(!snapshot.locked);
        assert_eq!(snapshot.status_message, "Security normal");
    }
}
