//! callbridge
//!
//! Marshals calls between a single-threaded managed runtime and a
//! multi-threaded native runtime reached over a C ABI.

pub mod bridge;

pub use bridge::{
    send_sync_to_native, start_native_runtime, stop_native_runtime, BridgeConfig, BridgeError,
    ClibRuntime, CompletionHandle, ManagedRuntime, NativeInstance, NativeRuntime, Outcome, Port,
};
