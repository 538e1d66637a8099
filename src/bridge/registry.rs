//! Process-wide registration of the running native runtime.
//!
//! The native side reaches back in through a bare C function pointer with no
//! user data, so the dispatcher it lands on has to be global. At most one
//! registration exists at a time; it is created by
//! [`start_native_runtime`](crate::bridge::lifecycle::start_native_runtime)
//! and removed by [`stop_native_runtime`](crate::bridge::lifecycle::stop_native_runtime).

use crate::bridge::error::BridgeError;
use crate::bridge::managed::{Generation, ManagedRuntime};
use crate::bridge::native::{NativeInstance, NativeRuntime, Port};
use crate::bridge::stats::StatsSnapshot;
use crate::bridge::worker::WorkerContext;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static REGISTRATION: Lazy<Mutex<Option<Registration>>> = Lazy::new(|| Mutex::new(None));

pub(crate) struct Registration {
    pub managed_port: Port,
    /// Set once the native start entry point returned a running handle.
    pub instance: Option<NativeInstance>,
    pub managed: ManagedRuntime,
    /// Callback generation on `managed`; the worker dispatcher is bound to it.
    pub generation: Generation,
    pub worker: WorkerContext,
}

fn slot() -> MutexGuard<'static, Option<Registration>> {
    REGISTRATION.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn register(registration: Registration) -> Result<(), BridgeError> {
    let mut slot = slot();
    if let Some(existing) = slot.as_ref() {
        return Err(BridgeError::AlreadyRegistered {
            managed_port: existing.managed_port,
        });
    }
    *slot = Some(registration);
    Ok(())
}

pub(crate) fn set_instance(instance: NativeInstance) {
    if let Some(registration) = slot().as_mut() {
        registration.instance = Some(instance);
    }
}

pub(crate) fn take() -> Option<Registration> {
    slot().take()
}

/// Drop the registration, if any, and uninstall its dispatch callback.
pub(crate) fn clear() {
    if let Some(registration) = take() {
        let _ = registration.managed.clear_callback(registration.generation);
    }
}

pub(crate) fn worker_context() -> Result<WorkerContext, BridgeError> {
    slot()
        .as_ref()
        .map(|registration| registration.worker.clone())
        .ok_or(BridgeError::NotRegistered)
}

pub(crate) fn native_for(instance: NativeInstance) -> Result<Arc<dyn NativeRuntime>, BridgeError> {
    match slot().as_ref() {
        Some(registration) if registration.instance == Some(instance) => {
            Ok(Arc::clone(&registration.worker.native))
        }
        _ => Err(BridgeError::InvalidInstance(instance)),
    }
}

pub fn is_registered() -> bool {
    slot().is_some()
}

/// Instance handle of the current registration, once its start has returned.
pub fn current_instance() -> Option<NativeInstance> {
    slot().as_ref().and_then(|registration| registration.instance)
}

/// Counters of the current registration.
pub fn stats() -> Option<StatsSnapshot> {
    slot()
        .as_ref()
        .map(|registration| registration.worker.stats.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::config::BridgeConfig;
    use crate::bridge::stats::BridgeStats;
    use crate::bridge::testing::{exclusive_registry, RecordingNative};

    fn registration(managed: &ManagedRuntime, port: i32) -> Registration {
        let generation = managed.next_generation();
        Registration {
            managed_port: Port(port),
            instance: None,
            managed: managed.clone(),
            generation,
            worker: WorkerContext::new(
                managed.dispatcher_for(generation).unwrap(),
                Arc::new(RecordingNative::new()),
                managed.shared_config(),
                Arc::new(BridgeStats::new()),
            ),
        }
    }

    #[test]
    fn test_single_registration() {
        let _guard = exclusive_registry();
        let managed = ManagedRuntime::spawn(BridgeConfig::default()).unwrap();

        assert!(!is_registered());
        assert!(matches!(worker_context(), Err(BridgeError::NotRegistered)));

        register(registration(&managed, 1)).unwrap();
        assert!(is_registered());
        assert!(worker_context().is_ok());

        let err = register(registration(&managed, 2)).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::AlreadyRegistered {
                managed_port: Port(1)
            }
        ));

        let taken = take().unwrap();
        assert_eq!(taken.managed_port, Port(1));
        assert!(!is_registered());
        register(registration(&managed, 2)).unwrap();
    }

    #[test]
    fn test_instance_lookup() {
        let _guard = exclusive_registry();
        let managed = ManagedRuntime::spawn(BridgeConfig::default()).unwrap();
        register(registration(&managed, 1)).unwrap();

        let instance = NativeInstance::from_raw(4);
        assert!(matches!(
            native_for(instance),
            Err(BridgeError::InvalidInstance(_))
        ));
        assert_eq!(current_instance(), None);

        set_instance(instance);
        assert!(native_for(instance).is_ok());
        assert!(native_for(NativeInstance::from_raw(5)).is_err());
        assert_eq!(current_instance(), Some(instance));
        assert_eq!(stats().unwrap().total_dispatched, 0);

        clear();
        assert!(native_for(instance).is_err());
        assert!(stats().is_none());
    }
}
