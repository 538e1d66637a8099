//! Capability to complete exactly one pending call.

use crate::bridge::correlator::{Outcome, ReplySender};
use crate::bridge::error::BridgeError;
use crate::bridge::native::Port;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Handed to the dispatch callback with every inbound call.
///
/// Clones share the same slot: whichever clone completes first wins, every
/// later `resolve`/`reject` is ignored with a warning and reported as
/// [`BridgeError::AlreadyCompleted`]. Dropping every clone without completing
/// abandons the call, which the waiting worker turns into a rejection.
#[derive(Clone)]
pub struct CompletionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    port: Port,
    slot: Mutex<Option<ReplySender>>,
}

impl CompletionHandle {
    pub(crate) fn new(port: Port, sender: ReplySender) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                port,
                slot: Mutex::new(Some(sender)),
            }),
        }
    }

    /// Port the call was addressed to.
    pub fn port(&self) -> Port {
        self.inner.port
    }

    pub fn resolve(&self, value: impl Into<String>) -> Result<(), BridgeError> {
        self.complete(Outcome::resolved(value))
    }

    pub fn reject(&self, value: impl Into<String>) -> Result<(), BridgeError> {
        self.complete(Outcome::rejected(value))
    }

    pub fn is_completed(&self) -> bool {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn complete(&self, outcome: Outcome) -> Result<(), BridgeError> {
        let port = self.inner.port;
        let sender = self
            .inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(sender) = sender else {
            tracing::warn!(
                port = port.0,
                is_rejection = outcome.is_rejection,
                "call already completed; ignoring second completion"
            );
            return Err(BridgeError::AlreadyCompleted { port });
        };

        if let Err(late) = sender.send(outcome) {
            tracing::debug!(
                port = port.0,
                is_rejection = late.is_rejection,
                "waiter already gave up; outcome discarded"
            );
        }
        Ok(())
    }
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("port", &self.inner.port)
            .field("completed", &self.is_completed())
            .finish()
    }
}
