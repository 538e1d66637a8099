//! Error type shared by every bridge operation.

use crate::bridge::native::{NativeInstance, Port};

/// Errors surfaced by the bridge itself.
///
/// Application-level failures never show up here: a rejected call is an
/// [`Outcome`](crate::bridge::correlator::Outcome) carrying a string, not an error.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no dispatch callback is registered")]
    NotRegistered,

    #[error("a native runtime is already registered for managed port {managed_port}")]
    AlreadyRegistered { managed_port: Port },

    #[error("instance {0} was not returned by a running start")]
    InvalidInstance(NativeInstance),

    #[error("call on port {port} was already completed")]
    AlreadyCompleted { port: Port },

    #[error("managed runtime has been shut down")]
    ManagedShutdown,

    #[error("managed task ended without producing a result")]
    TaskFailed,

    #[error("argument {index} contains an interior NUL byte")]
    InvalidArgument { index: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load native library: {0}")]
    Library(#[from] libloading::Error),
}
