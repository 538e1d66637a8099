//! Bidirectional call bridge between a managed runtime and a native runtime.
//!
//! The managed side is a single cooperative thread (see [`ManagedRuntime`]).
//! The native side is anything implementing [`NativeRuntime`], usually a C
//! library loaded through [`ClibRuntime`]. Native threads call in through a
//! C send function; each call gets its own worker thread, which hands the
//! call to the managed loop, waits for the [`CompletionHandle`] to be
//! resolved or rejected, and sends the outcome back through the native reply
//! entry point. The managed side calls out synchronously with
//! [`send_sync_to_native`].

pub mod completion;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod ffi;
pub mod lifecycle;
pub mod managed;
pub mod native;
mod registry;
pub mod relay;
pub mod stats;
#[cfg(test)]
pub(crate) mod testing;
pub mod worker;

pub use completion::CompletionHandle;
pub use config::BridgeConfig;
pub use correlator::{Outcome, WaitError};
pub use dispatcher::{Dispatcher, PendingCall};
pub use error::BridgeError;
pub use ffi::{ClibRuntime, ClibSymbols, SEND_ACCEPTED, SEND_REJECTED};
pub use lifecycle::{start_native_runtime, stop_native_runtime};
pub use managed::{DispatchCallback, ManagedRuntime};
pub use native::{ArgVector, NativeInstance, NativeRuntime, Port, RawSendFn};
pub use registry::{current_instance, is_registered, stats};
pub use relay::send_sync_to_native;
pub use stats::{BridgeStats, StatsSnapshot};
pub use worker::{InboundCall, WorkerContext};
