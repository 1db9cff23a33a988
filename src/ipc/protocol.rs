//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::GuardEvent;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current guard status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to guard event notifications
    Subscribe,

    /// Answer the open challenge with a code
    SubmitCode { code: String },

    /// Close the open challenge without a code
    CancelChallenge,

    /// Flip tray icon visibility
    ToggleTray,

    /// Clear failed attempts and any lockdown
    ResetSecurity,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current guard status
    Status(GuardStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Request applied
    Accepted,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Guard event occurred
    Event { event: GuardEvent },

    /// Client fell behind and missed events
    Lagged { skipped: u64 },
}

/// Frame written to a client: a response or a pushed notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Response(Response),
    Notification(Notification),
}

/// Full guard status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Whether challenges are currently refused
    pub locked: bool,

    /// Consecutive failed attempts
    pub failed_attempts: u32,

    /// Seconds left in the lockdown
    pub seconds_remaining: Option<u64>,

    /// Human-readable security status
    pub status_message: String,

    /// Whether the tray icon should be shown
    pub tray_visible: bool,

    /// Whether a live key sampler is running
    pub hotkey_registered: bool,

    /// Whether a challenge is waiting for an answer
    pub challenge_pending: bool,
}

impl Default for GuardStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: 0,
            locked: false,
            failed_attempts: 0,
            seconds_remaining: None,
            status_message: String::new(),
            tray_visible: true,
            hotkey_registered: false,
            challenge_pending: false,
        }
    }
}

impl Response {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::SubmitCode {
            code: "123456".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("submit_code"));
        assert!(json.contains("123456"));
    }

    #[test]
    fn test_request_deserialization() {
        let req: Request = serde_json::from_str(r#"{"type":"reset_security"}"#).unwrap();
        assert_eq!(req, Request::ResetSecurity);
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(GuardStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("tray_visible"));
    }

    #[test]
    fn test_notification_wraps_event() {
        let msg = ServerMessage::Notification(Notification::Event {
            event: GuardEvent::LockdownExpired,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"event","event":{"type":"lockdown_expired"}}"#);

        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
