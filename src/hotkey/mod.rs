//! Hotkey module for global chord detection
//!
//! Polls global key state and recognises the Control+K two-step chords
//! that drive the guard.

mod chord;
mod keys;
mod sampler;

pub use chord::{ChordDetector, ChordEvent};
pub use sampler::{platform_sampler, IdleSampler, KeySampler, POLL_INTERVAL};

#[cfg(test)]
pub use keys::{KeyId, KeySnapshot};
#[cfg(test)]
pub use sampler::ScriptedSampler;
