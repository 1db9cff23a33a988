//! Global key state sampling
//!
//! The guard polls key state instead of registering a system hotkey. On
//! macOS the state comes from `CGEventSourceKeyState`; elsewhere an idle
//! sampler reports nothing so the daemon can still serve IPC.

use std::time::{Duration, Instant};

use super::keys::{KeyId, KeySample, KeySnapshot};

/// Interval between key state polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Source of global key state
pub trait KeySampler: Send {
    /// Read the current state of every tracked key
    fn sample(&mut self) -> KeySnapshot;

    /// Whether this sampler observes real keyboard state
    fn is_live(&self) -> bool {
        true
    }
}

/// Errors that can occur while setting up key sampling
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[cfg(not(target_os = "macos"))]
    #[error("global key state is not available on this platform")]
    Unsupported,

    #[cfg(target_os = "macos")]
    #[error("key state access denied - check Input Monitoring permissions")]
    PermissionDenied,
}

/// Sampler used when no platform source exists
#[derive(Debug, Default)]
pub struct IdleSampler;

impl KeySampler for IdleSampler {
    fn sample(&mut self) -> KeySnapshot {
        KeySnapshot::default()
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// Collect one sample per tracked key using `is_down`
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn collect(now: Instant, mut is_down: impl FnMut(KeyId) -> bool) -> Vec<KeySample> {
    KeyId::ALL
        .iter()
        .map(|key| KeySample {
            key_id: *key,
            is_down: is_down(*key),
            timestamp: now,
        })
        .collect()
}

#[cfg(target_os = "macos")]
mod platform {
    use std::time::Instant;

    use core_graphics::event::CGKeyCode;
    use core_graphics::event_source::CGEventSourceStateID;
    use tracing::debug;

    use super::{collect, HotkeyError, KeySampler};
    use crate::hotkey::keys::{KeyId, KeySnapshot};

    #[link(name = "CoreGraphics", kind = "framework")]
    extern "C" {
        fn CGEventSourceKeyState(state_id: CGEventSourceStateID, key: CGKeyCode) -> bool;
        fn CGPreflightListenEventAccess() -> bool;
    }

    /// Virtual key codes from HIToolbox/Events.h
    mod vk {
        use core_graphics::event::CGKeyCode;

        pub const ANSI_K: CGKeyCode = 0x28;
        pub const ANSI_8: CGKeyCode = 0x1C;
        pub const ANSI_T: CGKeyCode = 0x11;
        pub const CONTROL: CGKeyCode = 0x3B;
        pub const RIGHT_CONTROL: CGKeyCode = 0x3E;
    }

    /// Polls the combined session key state
    #[derive(Debug)]
    pub struct MacKeySampler;

    impl MacKeySampler {
        pub fn new() -> Result<Self, HotkeyError> {
            // SAFETY: argument-free CoreGraphics query
            if !unsafe { CGPreflightListenEventAccess() } {
                return Err(HotkeyError::PermissionDenied);
            }
            debug!("CoreGraphics key state sampler ready");
            Ok(Self)
        }

        fn key_down(code: CGKeyCode) -> bool {
            // SAFETY: pure query of the window server key table
            unsafe { CGEventSourceKeyState(CGEventSourceStateID::CombinedSessionState, code) }
        }
    }

    impl KeySampler for MacKeySampler {
        fn sample(&mut self) -> KeySnapshot {
            let samples = collect(Instant::now(), |key| match key {
                KeyId::Control => Self::key_down(vk::CONTROL) || Self::key_down(vk::RIGHT_CONTROL),
                KeyId::K => Self::key_down(vk::ANSI_K),
                KeyId::Digit8 => Self::key_down(vk::ANSI_8),
                KeyId::T => Self::key_down(vk::ANSI_T),
            });
            KeySnapshot::from_samples(&samples)
        }
    }
}

/// Create the sampler for the current platform
pub fn platform_sampler() -> Result<Box<dyn KeySampler>, HotkeyError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(platform::MacKeySampler::new()?))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Err(HotkeyError::Unsupported)
    }
}

/// Replays a fixed sequence of snapshots, then reports no keys
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedSampler {
    frames: std::collections::VecDeque<KeySnapshot>,
}

#[cfg(test)]
impl ScriptedSampler {
    pub fn new(frames: impl IntoIterator<Item = KeySnapshot>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

#[cfg(test)]
impl KeySampler for ScriptedSampler {
    fn sample(&mut self) -> KeySnapshot {
        self.frames.pop_front().unwrap_or_default()
    }
}
