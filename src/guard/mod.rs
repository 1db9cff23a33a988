//! Guard module tying chord detection to the lockout policy
//!
//! Runs the polling loop, opens code challenges for UI clients, and
//! reports outcomes as `GuardEvent`s.

mod challenge;
mod context;
mod coordinator;

pub use challenge::{BrokerPrompt, ChallengeReply};
pub use context::GuardContext;
pub use coordinator::Guard;

#[cfg(test)]
pub use challenge::ChallengePrompt;
