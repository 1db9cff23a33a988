//! Two-step chord recognition over polled key snapshots
//!
//! Control+K arms the detector. Within the chord window a following
//! Control+8 or Control+T fires an event; otherwise the detector disarms.
//! Arming happens only on the prefix down-edge, so a prefix held across
//! many polls arms exactly once.

use std::time::{Duration, Instant};

use tracing::debug;

use super::keys::{Combo, KeySnapshot};

/// How long the suffix may follow the prefix
pub const CHORD_WINDOW: Duration = Duration::from_millis(2500);

/// Events produced by a completed chord
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordEvent {
    /// Control+K then Control+8
    ShowChallenge,
    /// Control+K then Control+T
    ToggleVisibility,
}

/// Arming state owned by the detector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ChordState {
    first_key_pressed: bool,
    first_key_time: Option<Instant>,
}

/// Polling chord detector
#[derive(Debug)]
pub struct ChordDetector {
    state: ChordState,
    /// Snapshot from the previous poll (for edge detection)
    prev: KeySnapshot,
    window: Duration,
}

impl Default for ChordDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChordDetector {
    /// Create a detector with the default chord window
    pub fn new() -> Self {
        Self::with_window(CHORD_WINDOW)
    }

    /// Create a detector with a custom chord window
    pub fn with_window(window: Duration) -> Self {
        Self {
            state: ChordState::default(),
            prev: KeySnapshot::default(),
            window,
        }
    }

    /// Whether the prefix has been seen and the window is open
    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.state.first_key_pressed
    }

    /// Disarm; keys still held keep counting as held
    pub fn reset(&mut self) {
        self.state = ChordState::default();
    }

    /// Feed one poll's key state; returns at most one event
    pub fn observe(&mut self, keys: KeySnapshot, now: Instant) -> Option<ChordEvent> {
        let event = self.step(keys, now);
        self.prev = keys;
        event
    }

    fn step(&mut self, keys: KeySnapshot, now: Instant) -> Option<ChordEvent> {
        if !self.state.first_key_pressed && self.is_down_edge(keys, Combo::Prefix) {
            debug!("chord prefix armed");
            self.state = ChordState {
                first_key_pressed: true,
                first_key_time: Some(now),
            };
        }

        let armed_at = match (self.state.first_key_pressed, self.state.first_key_time) {
            (true, Some(at)) => at,
            _ => return None,
        };

        if now.saturating_duration_since(armed_at) >= self.window {
            debug!("chord window elapsed, disarming");
            self.state = ChordState::default();
            return None;
        }

        let event = if keys.holds(Combo::Challenge) {
            ChordEvent::ShowChallenge
        } else if keys.holds(Combo::ToggleTray) {
            ChordEvent::ToggleVisibility
        } else {
            return None;
        };

        debug!(?event, "chord completed");
        self.state = ChordState::default();
        Some(event)
    }

    /// Combo is held now but was not fully held at the previous poll
    fn is_down_edge(&self, keys: KeySnapshot, combo: Combo) -> bool {
        keys.holds(combo) && !self.prev.holds(combo)
    }
}
