//! Thread-safe hand-off of inbound calls onto the managed thread.

use crate::bridge::completion::CompletionHandle;
use crate::bridge::correlator::{reply_channel, Outcome, ReplyReceiver, WaitError};
use crate::bridge::error::BridgeError;
use crate::bridge::managed::{Generation, ManagedCommand};
use crate::bridge::native::Port;
use std::time::Duration;
use tokio::sync::mpsc;

/// Gateway from any thread to the managed loop.
///
/// Each `dispatch` creates a fresh correlator, gives the managed callback a
/// [`CompletionHandle`] bound to it, and hands the waiting half back to the
/// caller as a [`PendingCall`]. Calls dispatched from different threads reach
/// the loop in whatever order the channel admits them; each is delivered
/// exactly once with its arguments intact.
///
/// A dispatcher bound to a callback generation only reaches that callback;
/// once it is replaced, its calls are abandoned.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<ManagedCommand>,
    generation: Option<Generation>,
}

impl Dispatcher {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<ManagedCommand>,
        generation: Option<Generation>,
    ) -> Self {
        Self { tx, generation }
    }

    pub fn dispatch(
        &self,
        port: Port,
        payload: impl Into<String>,
    ) -> Result<PendingCall, BridgeError> {
        let (sender, receiver) = reply_channel();
        let handle = CompletionHandle::new(port, sender);

        self.tx
            .send(ManagedCommand::Dispatch {
                generation: self.generation,
                port,
                payload: payload.into(),
                handle,
            })
            .map_err(|_| BridgeError::ManagedShutdown)?;

        tracing::debug!(port = port.0, "call handed to managed thread");
        Ok(PendingCall { port, receiver })
    }

    /// True once the managed loop has stopped accepting calls.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The waiting side of one dispatched call.
#[derive(Debug)]
pub struct PendingCall {
    port: Port,
    receiver: ReplyReceiver,
}

impl PendingCall {
    pub fn port(&self) -> Port {
        self.port
    }

    /// Block until the managed side completes the call.
    pub fn wait(self, timeout: Option<Duration>) -> Result<Outcome, WaitError> {
        self.receiver.wait(timeout)
    }
}
