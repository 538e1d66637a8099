//! Managed runtime host: one logical thread, cooperative scheduling.
//!
//! The loop runs on a dedicated OS thread with a current-thread Tokio runtime
//! driving a [`LocalSet`]. Every dispatch callback invocation and every
//! scheduled closure executes there, one at a time, in the order commands
//! arrive. Code on the loop can defer work with `tokio::task::spawn_local`.

use crate::bridge::completion::CompletionHandle;
use crate::bridge::config::BridgeConfig;
use crate::bridge::dispatcher::Dispatcher;
use crate::bridge::error::BridgeError;
use crate::bridge::native::Port;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver as StdReceiver;
use std::sync::mpsc::Sender as StdSender;
use std::sync::Arc;
use std::thread::ThreadId;
use tokio::sync::mpsc;
use tokio::task::LocalSet;

type InitSignalChannel = (
    StdSender<Result<(), std::io::Error>>,
    StdReceiver<Result<(), std::io::Error>>,
);

/// Target of every inbound call, invoked on the managed thread.
pub trait DispatchCallback: Send + 'static {
    fn dispatch(&mut self, port: Port, payload: String, handle: CompletionHandle);
}

impl<F> DispatchCallback for F
where
    F: FnMut(Port, String, CompletionHandle) + Send + 'static,
{
    fn dispatch(&mut self, port: Port, payload: String, handle: CompletionHandle) {
        self(port, payload, handle)
    }
}

/// Tags one installed callback. Dispatches bound to an older generation are
/// never handed to a newer callback.
pub(crate) type Generation = u64;

/// Commands sent to the managed thread.
pub(crate) enum ManagedCommand {
    InstallCallback {
        generation: Generation,
        callback: Box<dyn DispatchCallback>,
    },
    ClearCallback {
        generation: Generation,
    },
    Dispatch {
        /// `None` follows whichever callback is installed.
        generation: Option<Generation>,
        port: Port,
        payload: String,
        handle: CompletionHandle,
    },
    Run(Box<dyn FnOnce() + Send>),
    Shutdown {
        responder: StdSender<()>,
    },
}

fn spawn_managed_thread(
    config: &BridgeConfig,
) -> Result<(mpsc::UnboundedSender<ManagedCommand>, ThreadId), BridgeError> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ManagedCommand>();
    let (init_tx, init_rx): InitSignalChannel = std::sync::mpsc::channel();

    let join = std::thread::Builder::new()
        .name(config.managed_thread_name.clone())
        .spawn(move || {
            let tokio_rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => {
                    let _ = init_tx.send(Ok(()));
                    rt
                }
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let local = LocalSet::new();
            let mut core = ManagedLoop::default();
            local.block_on(&tokio_rt, async move {
                core.run(cmd_rx).await;
            });
            tracing::debug!("managed loop exited");
        })
        .map_err(|source| BridgeError::Spawn {
            what: "managed runtime",
            source,
        })?;

    let thread_id = join.thread().id();
    match init_rx.recv() {
        Ok(Ok(())) => Ok((cmd_tx, thread_id)),
        Ok(Err(source)) => Err(BridgeError::Spawn {
            what: "managed runtime",
            source,
        }),
        Err(_) => Err(BridgeError::ManagedShutdown),
    }
}

struct InstalledCallback {
    generation: Generation,
    callback: Box<dyn DispatchCallback>,
}

#[derive(Default)]
struct ManagedLoop {
    installed: Option<InstalledCallback>,
}

impl ManagedLoop {
    async fn run(&mut self, mut rx: mpsc::UnboundedReceiver<ManagedCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                ManagedCommand::InstallCallback {
                    generation,
                    callback,
                } => {
                    if self.installed.is_some() {
                        tracing::debug!(generation, "replacing dispatch callback");
                    }
                    self.installed = Some(InstalledCallback {
                        generation,
                        callback,
                    });
                }
                ManagedCommand::ClearCallback { generation } => {
                    if self
                        .installed
                        .as_ref()
                        .is_some_and(|installed| installed.generation == generation)
                    {
                        self.installed = None;
                    }
                }
                ManagedCommand::Dispatch {
                    generation,
                    port,
                    payload,
                    handle,
                } => self.dispatch(generation, port, payload, handle),
                ManagedCommand::Run(task) => {
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::error!("scheduled task panicked on the managed thread");
                    }
                }
                ManagedCommand::Shutdown { responder } => {
                    let _ = responder.send(());
                    break;
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        generation: Option<Generation>,
        port: Port,
        payload: String,
        handle: CompletionHandle,
    ) {
        // Returning early drops the handle, which abandons the call.
        let Some(installed) = self.installed.as_mut() else {
            tracing::error!(
                port = port.0,
                "inbound call arrived with no dispatch callback installed"
            );
            return;
        };
        if generation.is_some_and(|generation| generation != installed.generation) {
            tracing::warn!(
                port = port.0,
                call_generation = ?generation,
                installed_generation = installed.generation,
                "inbound call belongs to a removed registration"
            );
            return;
        }
        let callback = &mut installed.callback;

        let result = catch_unwind(AssertUnwindSafe(|| {
            callback.dispatch(port, payload, handle);
        }));
        if result.is_err() {
            tracing::error!(port = port.0, "dispatch callback panicked");
        }
    }
}

/// Handle to the managed thread. Cheap to clone; every clone talks to the same loop.
#[derive(Clone)]
pub struct ManagedRuntime {
    tx: Option<mpsc::UnboundedSender<ManagedCommand>>,
    shutdown: Arc<AtomicBool>,
    generations: Arc<AtomicU64>,
    thread_id: ThreadId,
    config: Arc<BridgeConfig>,
}

impl ManagedRuntime {
    pub fn spawn(config: BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        let (tx, thread_id) = spawn_managed_thread(&config)?;
        Ok(Self {
            tx: Some(tx),
            shutdown: Arc::new(AtomicBool::new(false)),
            generations: Arc::new(AtomicU64::new(0)),
            thread_id,
            config: Arc::new(config),
        })
    }

    fn sender(&self) -> Result<&mpsc::UnboundedSender<ManagedCommand>, BridgeError> {
        if self.is_shutdown() {
            return Err(BridgeError::ManagedShutdown);
        }
        self.tx.as_ref().ok_or(BridgeError::ManagedShutdown)
    }

    fn send(&self, cmd: ManagedCommand) -> Result<(), BridgeError> {
        self.sender()?
            .send(cmd)
            .map_err(|_| BridgeError::ManagedShutdown)
    }

    /// Thread-safe entry point for marshalling calls onto this loop.
    ///
    /// Calls go to whichever callback is installed when they arrive.
    pub fn dispatcher(&self) -> Result<Dispatcher, BridgeError> {
        Ok(Dispatcher::new(self.sender()?.clone(), None))
    }

    /// Dispatcher whose calls only reach the callback installed as `generation`.
    pub(crate) fn dispatcher_for(&self, generation: Generation) -> Result<Dispatcher, BridgeError> {
        Ok(Dispatcher::new(self.sender()?.clone(), Some(generation)))
    }

    pub(crate) fn next_generation(&self) -> Generation {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Install `callback` under a fresh generation and return it.
    pub(crate) fn install_callback(
        &self,
        callback: Box<dyn DispatchCallback>,
    ) -> Result<Generation, BridgeError> {
        let generation = self.next_generation();
        self.install_callback_as(generation, callback)?;
        Ok(generation)
    }

    pub(crate) fn install_callback_as(
        &self,
        generation: Generation,
        callback: Box<dyn DispatchCallback>,
    ) -> Result<(), BridgeError> {
        self.send(ManagedCommand::InstallCallback {
            generation,
            callback,
        })
    }

    /// Remove the callback if it is still the one installed as `generation`.
    pub(crate) fn clear_callback(&self, generation: Generation) -> Result<(), BridgeError> {
        self.send(ManagedCommand::ClearCallback { generation })
    }

    /// Queue `task` onto the managed thread without waiting for it.
    pub fn schedule<F>(&self, task: F) -> Result<(), BridgeError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(ManagedCommand::Run(Box::new(task)))
    }

    /// Run `f` on the managed thread and wait for its result.
    ///
    /// Runs inline when already called from the managed thread.
    pub fn invoke_sync<F, R>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_managed_thread() {
            return Ok(f());
        }

        let (result_tx, result_rx) = std::sync::mpsc::channel();
        self.schedule(move || {
            let _ = result_tx.send(f());
        })?;
        result_rx.recv().map_err(|_| BridgeError::TaskFailed)
    }

    pub fn is_managed_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    pub(crate) fn shared_config(&self) -> Arc<BridgeConfig> {
        Arc::clone(&self.config)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop the loop. Idempotent.
    ///
    /// Local tasks still pending on the loop are dropped along with any
    /// completion handles they hold.
    pub fn close(&mut self) -> Result<(), BridgeError> {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };

        let (result_tx, result_rx) = std::sync::mpsc::channel();
        if tx
            .send(ManagedCommand::Shutdown {
                responder: result_tx,
            })
            .is_err()
        {
            // Loop already gone.
            return Ok(());
        }

        // The loop cannot answer while we are running on it.
        if self.is_managed_thread() {
            return Ok(());
        }

        result_rx
            .recv()
            .map_err(|_| BridgeError::ManagedShutdown)
    }
}
