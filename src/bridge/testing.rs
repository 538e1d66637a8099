//! Shared test fixtures: a recording native runtime and registry isolation.

use crate::bridge::native::{ArgVector, NativeInstance, NativeRuntime, Port, RawSendFn};
use crate::bridge::registry;
use once_cell::sync::Lazy;
use std::ffi::CString;
use std::os::raw::c_int;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `cond` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReplyRecord {
    pub reply_port: Port,
    pub is_rejection: bool,
    pub payload: String,
}

impl ReplyRecord {
    pub fn new(reply_port: i32, is_rejection: bool, payload: &str) -> Self {
        Self {
            reply_port: Port(reply_port),
            is_rejection,
            payload: payload.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StartRecord {
    pub managed_port: Port,
    pub args: Vec<Option<String>>,
}

type Responder = Box<dyn Fn(NativeInstance, &str) -> String + Send + Sync>;

#[derive(Default)]
struct NativeState {
    starts: Vec<StartRecord>,
    send_fn: Option<RawSendFn>,
    replies: Vec<ReplyRecord>,
    sync_calls: Vec<(NativeInstance, String)>,
}

/// Native runtime double that records every entry point call.
pub(crate) struct RecordingNative {
    state: Mutex<NativeState>,
    replied: Condvar,
    start_result: i32,
    responder: Responder,
}

impl RecordingNative {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NativeState::default()),
            replied: Condvar::new(),
            start_result: 1,
            responder: Box::new(|_, payload| format!("native:{}", payload)),
        }
    }

    pub fn with_start_result(mut self, raw: i32) -> Self {
        self.start_result = raw;
        self
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(NativeInstance, &str) -> String + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    fn state(&self) -> MutexGuard<'_, NativeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn starts(&self) -> Vec<StartRecord> {
        self.state().starts.clone()
    }

    pub fn replies(&self) -> Vec<ReplyRecord> {
        self.state().replies.clone()
    }

    pub fn sync_calls(&self) -> Vec<(NativeInstance, String)> {
        self.state().sync_calls.clone()
    }

    pub fn wait_for_replies(&self, count: usize, timeout: Duration) -> Vec<ReplyRecord> {
        let guard = self.state();
        let (guard, _) = self
            .replied
            .wait_timeout_while(guard, timeout, |state| state.replies.len() < count)
            .unwrap_or_else(PoisonError::into_inner);
        guard.replies.clone()
    }

    /// Call the send function captured at start, as a native thread would.
    pub fn invoke(&self, port: i32, reply_port: i32, payload: &str) -> c_int {
        let send_fn = self.state().send_fn.expect("native runtime was not started");
        let payload = CString::new(payload).unwrap();
        send_fn(port, reply_port, payload.as_ptr())
    }
}

impl NativeRuntime for RecordingNative {
    fn start(&self, managed_port: Port, send_fn: RawSendFn, args: &ArgVector) -> i32 {
        let mut state = self.state();
        state.starts.push(StartRecord {
            managed_port,
            args: args.to_strings(),
        });
        state.send_fn = Some(send_fn);
        self.start_result
    }

    fn send_sync(&self, instance: NativeInstance, payload: &str) -> String {
        self.state()
            .sync_calls
            .push((instance, payload.to_string()));
        (self.responder)(instance, payload)
    }

    fn reply(&self, reply_port: Port, is_rejection: bool, payload: &str) -> i32 {
        self.state().replies.push(ReplyRecord {
            reply_port,
            is_rejection,
            payload: payload.to_string(),
        });
        self.replied.notify_all();
        0
    }
}

static REGISTRY_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Exclusive access to the process-wide registration for one test.
///
/// Clears the registration on entry and again on drop.
pub(crate) struct RegistryGuard {
    _lock: MutexGuard<'static, ()>,
}

pub(crate) fn exclusive_registry() -> RegistryGuard {
    init_test_logging();
    let lock = REGISTRY_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    registry::clear();
    RegistryGuard { _lock: lock }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        registry::clear();
    }
}
