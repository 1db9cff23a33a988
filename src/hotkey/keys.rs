//! Key identifiers and sampled key state
//!
//! Provides the small set of keys the chord detector cares about and a
//! snapshot type describing which of them are held at one poll.

use std::time::Instant;

/// Keys participating in the guard chords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyId {
    /// Either Control key
    Control,
    /// The K key
    K,
    /// The 8 key on the main row
    Digit8,
    /// The T key
    T,
}

impl KeyId {
    /// All keys, in a stable order
    pub const ALL: [KeyId; 4] = [KeyId::Control, KeyId::K, KeyId::Digit8, KeyId::T];

    fn bit(self) -> u8 {
        match self {
            KeyId::Control => 1 << 0,
            KeyId::K => 1 << 1,
            KeyId::Digit8 => 1 << 2,
            KeyId::T => 1 << 3,
        }
    }
}

/// A single key observation produced by a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySample {
    pub key_id: KeyId,
    pub is_down: bool,
    pub timestamp: Instant,
}

/// Which tracked keys are held down at one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySnapshot {
    down: u8,
}

impl KeySnapshot {
    /// Snapshot with the given keys held
    #[cfg(test)]
    pub fn with_keys(keys: &[KeyId]) -> Self {
        let mut snapshot = Self::default();
        for key in keys {
            snapshot.set(*key, true);
        }
        snapshot
    }

    /// Build a snapshot from individual samples; the newest sample per key wins
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a KeySample>) -> Self {
        let mut snapshot = Self::default();
        let mut newest: [Option<Instant>; 4] = [None; 4];
        for sample in samples {
            let slot = &mut newest[sample.key_id.bit().trailing_zeros() as usize];
            if slot.is_some_and(|at| sample.timestamp < at) {
                continue;
            }
            *slot = Some(sample.timestamp);
            snapshot.set(sample.key_id, sample.is_down);
        }
        snapshot
    }

    /// Mark a key as held or released
    pub fn set(&mut self, key: KeyId, is_down: bool) {
        if is_down {
            self.down |= key.bit();
        } else {
            self.down &= !key.bit();
        }
    }

    /// Check whether a key is held
    pub fn is_down(&self, key: KeyId) -> bool {
        self.down & key.bit() != 0
    }

    /// Check if no tracked key is held
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.down == 0
    }

    /// Check whether every key of `combo` is held
    pub fn holds(&self, combo: Combo) -> bool {
        combo.keys().iter().all(|key| self.is_down(*key))
    }
}

/// Key combinations recognised by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combo {
    /// Control+K, arms the chord
    Prefix,
    /// Control+8, requests the code challenge
    Challenge,
    /// Control+T, toggles tray visibility
    ToggleTray,
}

impl Combo {
    /// Keys that must all be held for the combo
    pub fn keys(self) -> &'static [KeyId] {
        match self {
            Combo::Prefix => &[KeyId::Control, KeyId::K],
            Combo::Challenge => &[KeyId::Control, KeyId::Digit8],
            Combo::ToggleTray => &[KeyId::Control, KeyId::T],
        }
    }
}
