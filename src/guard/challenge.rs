//! Code challenge hand-off between the guard and UI clients
//!
//! The guard opens a challenge and waits; a UI client connected over IPC
//! answers it with a code or a cancellation. At most one challenge is open.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};

use crate::events::GuardEvent;

/// How long an open challenge waits for an answer
pub const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Answer delivered by the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeReply {
    Code(String),
    Cancelled,
}

/// Errors raised when answering a challenge
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("no challenge is pending")]
    NotPending,

    #[error("a challenge is already pending")]
    AlreadyPending,
}

impl ChallengeError {
    /// Stable code for IPC error responses
    pub fn code(&self) -> &'static str {
        match self {
            ChallengeError::NotPending => "no_challenge",
            ChallengeError::AlreadyPending => "challenge_pending",
        }
    }
}

/// Single-slot rendezvous for challenge answers
#[derive(Debug, Clone, Default)]
pub struct ChallengeBroker {
    pending: Arc<Mutex<Option<oneshot::Sender<ChallengeReply>>>>,
}

impl ChallengeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a challenge; the receiver resolves when it is answered
    pub fn open(&self) -> Result<oneshot::Receiver<ChallengeReply>, ChallengeError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(ChallengeError::AlreadyPending);
        }
        let (tx, rx) = oneshot::channel();
        *pending = Some(tx);
        Ok(rx)
    }

    /// Deliver an answer to the open challenge
    pub fn answer(&self, reply: ChallengeReply) -> Result<(), ChallengeError> {
        let tx = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ChallengeError::NotPending)?;
        tx.send(reply).map_err(|_| ChallengeError::NotPending)
    }

    /// Whether a challenge is waiting for an answer
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Drop the open challenge, if any
    pub fn close(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Obtains a code from the user; `None` means nothing was entered
#[async_trait]
pub trait ChallengePrompt: Send + Sync {
    async fn prompt(&self, status: &str) -> Option<String>;
}

/// Prompt that asks subscribed IPC clients through the broker
pub struct BrokerPrompt {
    broker: ChallengeBroker,
    event_tx: broadcast::Sender<GuardEvent>,
    timeout: Duration,
}

impl BrokerPrompt {
    pub fn new(broker: ChallengeBroker, event_tx: broadcast::Sender<GuardEvent>) -> Self {
        Self {
            broker,
            event_tx,
            timeout: CHALLENGE_TIMEOUT,
        }
    }

    /// Override the answer timeout
    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ChallengePrompt for BrokerPrompt {
    async fn prompt(&self, status: &str) -> Option<String> {
        let rx = match self.broker.open() {
            Ok(rx) => rx,
            Err(e) => {
                debug!(error = %e, "challenge not opened");
                return None;
            }
        };

        let _ = self.event_tx.send(GuardEvent::ChallengeRequested {
            status: status.to_string(),
        });

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(ChallengeReply::Code(code))) => Some(code),
            Ok(Ok(ChallengeReply::Cancelled)) | Ok(Err(_)) => {
                debug!("challenge cancelled");
                None
            }
            Err(_) => {
                info!(timeout_secs = self.timeout.as_secs(), "challenge timed out");
                self.broker.close();
                None
            }
        }
    }
}
