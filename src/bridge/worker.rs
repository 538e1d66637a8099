//! Inbound call workers: one OS thread per native-to-managed call.
//!
//! A worker dispatches its call, blocks on the correlator until the managed
//! side completes it (or the wait fails), and delivers the outcome through the
//! native reply entry point when a reply port was given. Workers share only
//! the read-only [`WorkerContext`] and the atomic counters.

use crate::bridge::config::BridgeConfig;
use crate::bridge::correlator::Outcome;
use crate::bridge::dispatcher::Dispatcher;
use crate::bridge::error::BridgeError;
use crate::bridge::native::{NativeRuntime, Port};
use crate::bridge::stats::BridgeStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

static WORKER_SEQ: AtomicU64 = AtomicU64::new(0);

/// One request from the native side, as received by the send function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCall {
    pub port: Port,
    pub reply_port: Port,
    pub payload: String,
}

impl InboundCall {
    pub fn new(port: Port, reply_port: Port, payload: impl Into<String>) -> Self {
        Self {
            port,
            reply_port,
            payload: payload.into(),
        }
    }
}

/// Everything a worker needs, cloned into each worker thread.
#[derive(Clone)]
pub struct WorkerContext {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) native: Arc<dyn NativeRuntime>,
    pub(crate) config: Arc<BridgeConfig>,
    pub(crate) stats: Arc<BridgeStats>,
}

impl WorkerContext {
    pub fn new(
        dispatcher: Dispatcher,
        native: Arc<dyn NativeRuntime>,
        config: Arc<BridgeConfig>,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            dispatcher,
            native,
            config,
            stats,
        }
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }
}

/// Run one call to completion on the current thread and return its outcome.
pub fn run_worker(ctx: &WorkerContext, call: InboundCall) -> Outcome {
    let InboundCall {
        port,
        reply_port,
        payload,
    } = call;

    ctx.stats.record_dispatch();
    let outcome = match ctx.dispatcher.dispatch(port, payload) {
        Ok(pending) => match pending.wait(ctx.config.reply_timeout()) {
            Ok(outcome) => {
                ctx.stats.record_outcome(&outcome);
                outcome
            }
            Err(err) => {
                tracing::warn!(
                    port = port.0,
                    reply_port = reply_port.0,
                    error = %err,
                    "wait for completion failed"
                );
                ctx.stats.record_failure();
                err.into_outcome()
            }
        },
        Err(err) => {
            tracing::warn!(
                port = port.0,
                reply_port = reply_port.0,
                error = %err,
                "could not dispatch inbound call"
            );
            ctx.stats.record_failure();
            Outcome::rejected(err.to_string())
        }
    };

    deliver(ctx.native.as_ref(), reply_port, &outcome);
    outcome
}

fn deliver(native: &dyn NativeRuntime, reply_port: Port, outcome: &Outcome) {
    if reply_port.is_none() {
        tracing::debug!(
            is_rejection = outcome.is_rejection,
            "no reply requested; outcome discarded"
        );
        return;
    }
    let status = native.reply(reply_port, outcome.is_rejection, &outcome.value);
    tracing::debug!(
        reply_port = reply_port.0,
        is_rejection = outcome.is_rejection,
        status,
        "reply delivered to native runtime"
    );
}

/// Start a dedicated worker thread for `call`.
pub fn spawn_worker(
    ctx: WorkerContext,
    call: InboundCall,
) -> Result<JoinHandle<Outcome>, BridgeError> {
    let seq = WORKER_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut builder =
        thread::Builder::new().name(format!("{}-{}", ctx.config.worker_thread_prefix, seq));
    if let Some(bytes) = ctx.config.worker_stack_size {
        builder = builder.stack_size(bytes);
    }

    builder
        .spawn(move || run_worker(&ctx, call))
        .map_err(|source| BridgeError::Spawn {
            what: "inbound worker",
            source,
        })
}

/// Spawn a detached worker; if that fails, reject the call from the current thread.
pub fn submit(ctx: &WorkerContext, call: InboundCall) -> Result<(), BridgeError> {
    let reply_port = call.reply_port;
    match spawn_worker(ctx.clone(), call) {
        Ok(_detached) => Ok(()),
        Err(err) => {
            tracing::error!(
                reply_port = reply_port.0,
                error = %err,
                "inbound worker not started"
            );
            ctx.stats.record_dispatch();
            ctx.stats.record_failure();
            deliver(
                ctx.native.as_ref(),
                reply_port,
                &Outcome::rejected(err.to_string()),
            );
            Err(err)
        }
    }
}
