//! One-shot reply correlation between a pending call and its outcome.
//!
//! Each inbound call gets a capacity-one channel. The managed side holds the
//! sending half (inside a [`CompletionHandle`](crate::bridge::completion::CompletionHandle)),
//! the inbound worker blocks on the receiving half.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

/// Result of one pending call, produced once and consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub is_rejection: bool,
    pub value: String,
}

impl Outcome {
    pub fn resolved(value: impl Into<String>) -> Self {
        Self {
            is_rejection: false,
            value: value.into(),
        }
    }

    pub fn rejected(value: impl Into<String>) -> Self {
        Self {
            is_rejection: true,
            value: value.into(),
        }
    }
}

/// Why a wait ended without an outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// Every handle for the call was dropped without completing it.
    #[error("completion handle was dropped before the call was completed")]
    Abandoned,

    #[error("no completion within {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl WaitError {
    pub fn into_outcome(self) -> Outcome {
        Outcome::rejected(self.to_string())
    }
}

/// Create a linked sender/receiver pair for one call.
pub fn reply_channel() -> (ReplySender, ReplyReceiver) {
    let (tx, rx) = mpsc::sync_channel(1);
    (ReplySender(tx), ReplyReceiver(rx))
}

#[derive(Debug)]
pub struct ReplySender(SyncSender<Outcome>);

impl ReplySender {
    /// Store the outcome. Consumes the sender, so a second send is impossible.
    ///
    /// Returns the outcome back when the waiter is already gone.
    pub fn send(self, outcome: Outcome) -> Result<(), Outcome> {
        self.0.try_send(outcome).map_err(|err| match err {
            TrySendError::Full(outcome) | TrySendError::Disconnected(outcome) => outcome,
        })
    }
}

#[derive(Debug)]
pub struct ReplyReceiver(Receiver<Outcome>);

impl ReplyReceiver {
    /// Block until the outcome arrives, the sender is dropped, or `timeout` expires.
    pub fn wait(self, timeout: Option<Duration>) -> Result<Outcome, WaitError> {
        match timeout {
            None => self.0.recv().map_err(|_| WaitError::Abandoned),
            Some(limit) => self.0.recv_timeout(limit).map_err(|err| match err {
                RecvTimeoutError::Timeout => WaitError::TimedOut(limit),
                RecvTimeoutError::Disconnected => WaitError::Abandoned,
            }),
        }
    }
}
