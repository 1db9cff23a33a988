//! Lockout state snapshot
//!
//! The serialized form keeps the field names of the on-disk
//! `security_state.json` (`FailedAttempts`, `IsLocked`, `LockdownUntil`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failed-attempt counter and lockdown deadline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub is_locked: bool,
    pub lockdown_until: Option<DateTime<Utc>>,
}

/// What `normalize` had to change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// State was consistent and current
    Unchanged,
    /// Lockdown deadline has passed; state reset
    Expired,
    /// Lock flag and deadline disagreed; state repaired
    Repaired,
}

impl LockoutState {
    /// Whether the lockdown deadline has been reached at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lockdown_until, Some(until) if now >= until)
    }

    /// Bring a restored snapshot back in line with the lockout invariants
    pub fn normalize(&mut self, now: DateTime<Utc>) -> Normalization {
        if self.is_expired(now) {
            *self = Self::default();
            return Normalization::Expired;
        }

        match (self.is_locked, self.lockdown_until) {
            // Locked without a deadline can never expire
            (true, None) => {
                *self = Self::default();
                Normalization::Repaired
            }
            (false, Some(_)) => {
                self.lockdown_until = None;
                Normalization::Repaired
            }
            _ => Normalization::Unchanged,
        }
    }
}

/// Hide an attempted code for the event log: first and last character only
pub fn mask_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    match chars.len() {
        0 => "***".to_string(),
        n @ 1..=2 => "*".repeat(n),
        n => {
            let mut masked = String::with_capacity(n);
            masked.push(chars[0]);
            masked.push_str(&"*".repeat(n - 2));
            masked.push(chars[n - 1]);
            masked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_mask_code() {
        assert_eq!(mask_code("123456"), "1****6");
        assert_eq!(mask_code(""), "***");
        assert_eq!(mask_code("ab"), "**");
        assert_eq!(mask_code("a"), "*");
        assert_eq!(mask_code("abc"), "a*c");
    }

    #[test]
    fn test_mask_code_multibyte() {
        assert_eq!(mask_code("ñ12é"), "ñ**é");
    }

    #[test]
    fn test_serialized_field_names() {
        let state = LockoutState {
            failed_attempts: 3,
            is_locked: true,
            lockdown_until: Some(noon()),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"FailedAttempts\":3"));
        assert!(json.contains("\"IsLocked\":true"));
        assert!(json.contains("\"LockdownUntil\":\"2026-03-01T12:00:00Z\""));
    }

    #[test]
    fn test_deserialize_null_deadline_and_missing_fields() {
        let state: LockoutState =
            serde_json::from_str(r#"{"FailedAttempts":2,"LockdownUntil":null}"#).unwrap();
        assert_eq!(state.failed_attempts, 2);
        assert!(!state.is_locked);
        assert_eq!(state.lockdown_until, None);
    }

    #[test]
    fn test_deserialize_offset_deadline() {
        let state: LockoutState =
            serde_json::from_str(r#"{"IsLocked":true,"LockdownUntil":"2026-03-01T19:00:00+07:00"}"#)
                .unwrap();
        assert_eq!(state.lockdown_until, Some(noon()));
    }

    #[test]
    fn test_normalize_expired() {
        let mut state = LockoutState {
            failed_attempts: 3,
            is_locked: true,
            lockdown_until: Some(noon()),
        };
        assert_eq!(state.normalize(noon()), Normalization::Expired);
        assert_eq!(state, LockoutState::default());
    }

    #[test]
    fn test_normalize_active_lockdown_unchanged() {
        let mut state = LockoutState {
            failed_attempts: 3,
            is_locked: true,
            lockdown_until: Some(noon() + Duration::minutes(10)),
        };
        let before = state;
        assert_eq!(state.normalize(noon()), Normalization::Unchanged);
        assert_eq!(state, before);
    }

    #[test]
    fn test_normalize_locked_without_deadline() {
        let mut state = LockoutState {
            failed_attempts: 3,
            is_locked: true,
            lockdown_until: None,
        };
        assert_eq!(state.normalize(noon()), Normalization::Repaired);
        assert_eq!(state, LockoutState::default());
    }

    #[test]
    fn test_normalize_stray_deadline() {
        let mut state = LockoutState {
            failed_attempts: 1,
            is_locked: false,
            lockdown_until: Some(noon() + Duration::minutes(1)),
        };
        assert_eq!(state.normalize(noon()), Normalization::Repaired);
        assert_eq!(state.failed_attempts, 1);
        assert_eq!(state.lockdown_until, None);
    }
}
