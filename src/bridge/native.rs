//! Contract with the native runtime.
//!
//! The native side is reached only through the three entry points of
//! [`NativeRuntime`] and calls back through the [`RawSendFn`] it receives at
//! start. Everything crossing that boundary is a port number or one opaque
//! string.

use crate::bridge::error::BridgeError;
use std::ffi::{c_void, CStr, CString};
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::ptr;

/// Callback pointer the native runtime invokes to reach the managed side:
/// `(port, reply_port, payload) -> status`.
pub type RawSendFn = extern "C" fn(c_int, c_int, *const c_char) -> c_int;

/// Opaque integer address. Never interpreted by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port(pub i32);

impl Port {
    /// Reply port meaning "no reply requested".
    pub const NONE: Port = Port(0);

    pub fn is_none(self) -> bool {
        self == Port::NONE
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for Port {
    fn from(raw: i32) -> Self {
        Port(raw)
    }
}

/// Handle for one running native runtime, as returned by its start entry point.
///
/// Negative values are the native side's failure sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeInstance(i32);

impl NativeInstance {
    pub fn from_raw(raw: i32) -> Self {
        NativeInstance(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn is_running(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for NativeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three entry points a native runtime exposes.
///
/// `reply` and `send_sync` may be called from any thread; `start` is called
/// once per registration from whichever thread runs the lifecycle.
pub trait NativeRuntime: Send + Sync + 'static {
    /// Start the runtime. The return value becomes the [`NativeInstance`].
    fn start(&self, managed_port: Port, send_fn: RawSendFn, args: &ArgVector) -> i32;

    /// Synchronous managed-to-native call. Blocks the caller until it returns.
    fn send_sync(&self, instance: NativeInstance, payload: &str) -> String;

    /// Deliver the outcome of an inbound call, correlated by `reply_port`.
    fn reply(&self, reply_port: Port, is_rejection: bool, payload: &str) -> i32;
}

pub type GoInt = i64;

/// Slice header in the layout the native library's start symbol expects.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GoSlice {
    pub data: *mut c_void,
    pub len: GoInt,
    pub cap: GoInt,
}

/// C copies of the startup arguments.
///
/// Missing arguments are null pointers. Every buffer is freed on drop, so the
/// vector only needs to outlive the native start call.
pub struct ArgVector {
    ptrs: Vec<*mut c_char>,
}

impl ArgVector {
    pub fn new<S: AsRef<str>>(args: &[Option<S>]) -> Result<Self, BridgeError> {
        let mut argv = ArgVector {
            ptrs: Vec::with_capacity(args.len()),
        };
        for (index, arg) in args.iter().enumerate() {
            let ptr = match arg {
                Some(value) => CString::new(value.as_ref())
                    .map_err(|_| BridgeError::InvalidArgument { index })?
                    .into_raw(),
                None => ptr::null_mut(),
            };
            argv.ptrs.push(ptr);
        }
        Ok(argv)
    }

    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    /// Argument at `index`; `Some(None)` for a gap.
    pub fn get(&self, index: usize) -> Option<Option<&CStr>> {
        self.ptrs.get(index).map(|&ptr| {
            if ptr.is_null() {
                None
            } else {
                // SAFETY: non-null entries come from CString::into_raw and live until drop.
                Some(unsafe { CStr::from_ptr(ptr) })
            }
        })
    }

    pub fn to_strings(&self) -> Vec<Option<String>> {
        (0..self.len())
            .map(|i| {
                self.get(i)
                    .flatten()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .collect()
    }

    pub fn as_go_slice(&self) -> GoSlice {
        let len = self.ptrs.len() as GoInt;
        GoSlice {
            data: self.ptrs.as_ptr() as *mut c_void,
            len,
            cap: len,
        }
    }
}

impl Drop for ArgVector {
    fn drop(&mut self) {
        for ptr in self.ptrs.drain(..) {
            if !ptr.is_null() {
                // SAFETY: produced by CString::into_raw in ArgVector::new.
                drop(unsafe { CString::from_raw(ptr) });
            }
        }
    }
}

impl fmt::Debug for ArgVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_strings()).finish()
    }
}
