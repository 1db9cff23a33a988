//! Events module for guard notifications
//!
//! Provides structured event types broadcast by the guard and the lockout
//! policy. Subscribed UI clients render them as notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by the guard during challenge and lockout handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardEvent {
    /// A code challenge is open and waiting for `SubmitCode`
    ChallengeRequested {
        /// Current security status line to show in the prompt
        status: String,
    },

    /// Challenge closed without a code (cancelled or timed out)
    ChallengeCancelled,

    /// Code matched
    ChallengeSucceeded,

    /// Code did not match, lockout threshold not reached
    ChallengeFailed {
        failed_attempts: u32,
        status: String,
    },

    /// Code did not match and the guard entered lockdown
    SecurityBreach {
        lockdown_until: DateTime<Utc>,
        status: String,
    },

    /// Challenge chord pressed during an active lockdown
    LockdownActive {
        status: String,
    },

    /// Lockdown reached its deadline and was lifted
    LockdownExpired,

    /// Remote revocation sequence finished
    RevocationCompleted {
        revoked: bool,
        detail: String,
    },

    /// Tray icon visibility was toggled
    TrayVisibilityChanged {
        visible: bool,
        hint: String,
    },

    /// Operator cleared the security state
    SecurityReset,
}

impl std::fmt::Display for GuardEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardEvent::ChallengeRequested { .. } => write!(f, "CHALLENGE_REQUESTED"),
            GuardEvent::ChallengeCancelled => write!(f, "CHALLENGE_CANCELLED"),
            GuardEvent::ChallengeSucceeded => write!(f, "CHALLENGE_SUCCEEDED"),
            GuardEvent::ChallengeFailed { failed_attempts, .. } => {
                write!(f, "CHALLENGE_FAILED (attempt {})", failed_attempts)
            }
            GuardEvent::SecurityBreach { lockdown_until, .. } => {
                write!(f, "SECURITY_BREACH (until {})", lockdown_until.to_rfc3339())
            }
            GuardEvent::LockdownActive { .. } => write!(f, "LOCKDOWN_ACTIVE"),
            GuardEvent::LockdownExpired => write!(f, "LOCKDOWN_EXPIRED"),
            GuardEvent::RevocationCompleted { revoked, .. } => {
                write!(f, "REVOCATION_COMPLETED (revoked={})", revoked)
            }
            GuardEvent::TrayVisibilityChanged { visible, .. } => {
                write!(f, "TRAY_VISIBILITY_CHANGED (visible={})", visible)
            }
            GuardEvent::SecurityReset => write!(f, "SECURITY_RESET"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = GuardEvent::ChallengeFailed {
            failed_attempts: 2,
            status: "2/3 failed attempts".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("challenge_failed"));
        assert!(json.contains("\"failed_attempts\":2"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"lockdown_expired"}"#;
        let event: GuardEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, GuardEvent::LockdownExpired);
    }

    #[test]
    fn test_event_display() {
        let event = GuardEvent::RevocationCompleted {
            revoked: false,
            detail: "status 500".to_string(),
        };
        assert_eq!(event.to_string(), "REVOCATION_COMPLETED (revoked=false)");
    }
}
