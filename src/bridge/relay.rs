//! Synchronous managed-to-native calls.

use crate::bridge::error::BridgeError;
use crate::bridge::native::NativeInstance;
use crate::bridge::registry;

/// Call into the native runtime and return its answer.
///
/// Blocks the calling thread until the native side returns. Called from the
/// managed thread this stalls the whole managed loop for the duration, so no
/// other dispatch or scheduled task runs meanwhile. A native implementation
/// that waits on a managed reply from inside this call will deadlock.
///
/// `instance` must be the handle returned by the running start of the
/// current registration.
pub fn send_sync_to_native(instance: NativeInstance, payload: &str) -> Result<String, BridgeError> {
    let native = registry::native_for(instance)?;
    tracing::debug!(
        instance = instance.raw(),
        len = payload.len(),
        "sync call into native runtime"
    );
    let answer = native.send_sync(instance, payload);
    tracing::debug!(
        instance = instance.raw(),
        len = answer.len(),
        "native runtime answered"
    );
    Ok(answer)
}
