//! C boundary: the send function handed to the native runtime, and a
//! [`NativeRuntime`] backed by a dynamically loaded C library.

use crate::bridge::error::BridgeError;
use crate::bridge::native::{ArgVector, GoSlice, NativeInstance, NativeRuntime, Port, RawSendFn};
use crate::bridge::registry;
use crate::bridge::worker::{self, InboundCall};
use libloading::Library;
use std::ffi::{CStr, CString, OsStr};
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Send function status: the call was handed to a worker.
pub const SEND_ACCEPTED: c_int = 0;
/// Send function status: the call could not be accepted.
pub const SEND_REJECTED: c_int = -1;

/// Process-wide send function given to the native runtime at start.
///
/// Safe to call from any native thread. The payload is copied before
/// returning; the real answer arrives later through the reply entry point.
pub(crate) extern "C" fn send_to_managed(
    port: c_int,
    reply_port: c_int,
    payload: *const c_char,
) -> c_int {
    let accepted = catch_unwind(AssertUnwindSafe(|| {
        let payload = if payload.is_null() {
            String::new()
        } else {
            // SAFETY: the native caller passes a NUL-terminated string valid for this call.
            unsafe { CStr::from_ptr(payload) }
                .to_string_lossy()
                .into_owned()
        };
        accept(InboundCall::new(Port(port), Port(reply_port), payload))
    }));

    match accepted {
        Ok(Ok(())) => SEND_ACCEPTED,
        Ok(Err(err)) => {
            tracing::error!(port, reply_port, error = %err, "inbound call rejected");
            SEND_REJECTED
        }
        Err(_) => {
            tracing::error!(port, reply_port, "panic while accepting inbound call");
            SEND_REJECTED
        }
    }
}

fn accept(call: InboundCall) -> Result<(), BridgeError> {
    let ctx = registry::worker_context()?;
    worker::submit(&ctx, call)
}

type RunClibFn = unsafe extern "C" fn(c_int, RawSendFn, GoSlice) -> c_int;
type SendToClibFn = unsafe extern "C" fn(c_int, *const c_char) -> *const c_char;
type ReplyToClibFn = unsafe extern "C" fn(c_int, c_int, *const c_char) -> c_int;

/// Exported symbol names of the native library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClibSymbols {
    pub start: String,
    pub send: String,
    pub reply: String,
}

impl Default for ClibSymbols {
    fn default() -> Self {
        Self {
            start: "RunClib".to_string(),
            send: "SendToClib".to_string(),
            reply: "ReplyToClib".to_string(),
        }
    }
}

/// Native runtime living in a shared library.
pub struct ClibRuntime {
    run: RunClibFn,
    send: SendToClibFn,
    reply: ReplyToClibFn,
    // Keeps the symbols above valid. `None` when built from bare fn pointers.
    _library: Option<Library>,
}

impl ClibRuntime {
    pub fn load(path: impl AsRef<OsStr>) -> Result<Self, BridgeError> {
        Self::load_with(path, &ClibSymbols::default())
    }

    pub fn load_with(path: impl AsRef<OsStr>, symbols: &ClibSymbols) -> Result<Self, BridgeError> {
        // SAFETY: loading runs the library's initializers; the caller vouches for the library.
        let library = unsafe { Library::new(path.as_ref()) }?;
        // SAFETY: the symbol types match the native library's exported signatures.
        let (run, send, reply) = unsafe {
            (
                *library.get::<RunClibFn>(symbols.start.as_bytes())?,
                *library.get::<SendToClibFn>(symbols.send.as_bytes())?,
                *library.get::<ReplyToClibFn>(symbols.reply.as_bytes())?,
            )
        };
        tracing::debug!(path = ?path.as_ref(), "native library loaded");
        Ok(Self {
            run,
            send,
            reply,
            _library: Some(library),
        })
    }

    #[cfg(test)]
    fn from_fns(run: RunClibFn, send: SendToClibFn, reply: ReplyToClibFn) -> Self {
        Self {
            run,
            send,
            reply,
            _library: None,
        }
    }
}

impl NativeRuntime for ClibRuntime {
    fn start(&self, managed_port: Port, send_fn: RawSendFn, args: &ArgVector) -> i32 {
        // SAFETY: `args` outlives the call and its slice points at valid C strings or nulls.
        unsafe { (self.run)(managed_port.0, send_fn, args.as_go_slice()) }
    }

    fn send_sync(&self, instance: NativeInstance, payload: &str) -> String {
        let payload = to_c_payload(payload);
        // SAFETY: payload is NUL-terminated and alive for the duration of the call.
        let result = unsafe { (self.send)(instance.raw(), payload.as_ptr()) };
        if result.is_null() {
            return String::new();
        }
        // SAFETY: the native side returns a NUL-terminated string it keeps ownership of.
        unsafe { CStr::from_ptr(result) }
            .to_string_lossy()
            .into_owned()
    }

    fn reply(&self, reply_port: Port, is_rejection: bool, payload: &str) -> i32 {
        let payload = to_c_payload(payload);
        // SAFETY: payload is NUL-terminated and alive for the duration of the call.
        unsafe { (self.reply)(reply_port.0, c_int::from(is_rejection), payload.as_ptr()) }
    }
}

/// C view of `payload`: everything up to the first NUL byte.
fn to_c_payload(payload: &str) -> CString {
    match CString::new(payload) {
        Ok(c_string) => c_string,
        Err(err) => {
            let position = err.nul_position();
            tracing::warn!(
                position,
                len = payload.len(),
                "payload truncated at interior NUL"
            );
            let mut bytes = err.into_vec();
            bytes.truncate(position);
            CString::new(bytes).unwrap_or_default()
        }
    }
}
