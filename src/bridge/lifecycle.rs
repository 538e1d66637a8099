//! Starting and stopping the native runtime.

use crate::bridge::error::BridgeError;
use crate::bridge::ffi;
use crate::bridge::managed::{DispatchCallback, ManagedRuntime};
use crate::bridge::native::{ArgVector, NativeInstance, NativeRuntime, Port};
use crate::bridge::registry::{self, Registration};
use crate::bridge::stats::BridgeStats;
use crate::bridge::worker::WorkerContext;
use std::sync::Arc;

/// Register `callback` as the target of native-to-managed calls and start
/// the native runtime with `args`.
///
/// The registration is in place before the native start entry point runs, so
/// calls the native side makes during startup are already routed. Absent
/// arguments are passed as null strings. The argument vector is released as
/// soon as the start entry point returns.
///
/// A native start that reports failure is not an error: the returned handle
/// has [`NativeInstance::is_running`] false and the registration is undone.
pub fn start_native_runtime<C, S>(
    managed: &ManagedRuntime,
    native: Arc<dyn NativeRuntime>,
    managed_port: Port,
    callback: C,
    args: &[Option<S>],
) -> Result<NativeInstance, BridgeError>
where
    C: DispatchCallback,
    S: AsRef<str>,
{
    let argv = ArgVector::new(args)?;
    let generation = managed.next_generation();
    let worker = WorkerContext::new(
        managed.dispatcher_for(generation)?,
        Arc::clone(&native),
        managed.shared_config(),
        Arc::new(BridgeStats::new()),
    );
    registry::register(Registration {
        managed_port,
        instance: None,
        managed: managed.clone(),
        generation,
        worker,
    })?;

    if let Err(err) = managed.install_callback_as(generation, Box::new(callback)) {
        registry::take();
        return Err(err);
    }

    tracing::debug!(
        managed_port = managed_port.0,
        args = argv.len(),
        "starting native runtime"
    );
    let raw = native.start(managed_port, ffi::send_to_managed, &argv);
    let instance = NativeInstance::from_raw(raw);
    drop(argv);

    if instance.is_running() {
        registry::set_instance(instance);
        tracing::info!(
            managed_port = managed_port.0,
            instance = instance.raw(),
            "native runtime started"
        );
    } else {
        registry::clear();
        tracing::warn!(
            managed_port = managed_port.0,
            status = instance.raw(),
            "native runtime failed to start"
        );
    }
    Ok(instance)
}

/// Tear down the current registration.
///
/// Calls the native runtime sends afterwards are rejected at the send
/// function. Calls already accepted keep running to completion; those not yet
/// handed to the managed thread are rejected as abandoned, even once a later
/// start has installed a new callback. The native runtime itself is left
/// running.
pub fn stop_native_runtime() -> Result<(), BridgeError> {
    let registration = registry::take().ok_or(BridgeError::NotRegistered)?;
    if let Err(err) = registration.managed.clear_callback(registration.generation) {
        tracing::debug!(error = %err, "managed runtime already gone at stop");
    }
    tracing::info!(
        managed_port = registration.managed_port.0,
        "native runtime registration removed"
    );
    Ok(())
}
