//! The plumbing half of the isolated context: a dedicated thread that owns
//! the QuickJS runtime, evaluates the bootstrap document, and serves the
//! inbound command loop. Everything observable leaves through the output
//! channel as wire messages.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use rquickjs::function::Func;
use rquickjs::{Context, Function, Runtime};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::console::OutputChannel;
use crate::protocol;
use crate::sandbox::{document, SandboxLimits};

/// Commands delivered to the worker thread. `Deliver` carries raw wire text;
/// `Flush` is a host-side barrier and never crosses into the context.
pub(crate) enum WorkerCommand {
    Deliver(String),
    Flush(oneshot::Sender<()>),
}

/// Handle to a running worker. Dropping it closes the command channel, which
/// makes the worker thread exit and the context unload.
pub(crate) struct WorkerHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
}

impl WorkerHandle {
    pub(crate) fn deliver(&self, raw: String) -> Result<(), ()> {
        self.commands
            .send(WorkerCommand::Deliver(raw))
            .map_err(|_| ())
    }

    pub(crate) fn flush(&self, ack: oneshot::Sender<()>) -> Result<(), ()> {
        self.commands.send(WorkerCommand::Flush(ack)).map_err(|_| ())
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Spawn a fresh isolated context on its own thread. The returned oneshot
/// resolves once the bootstrap document finished evaluating; initialization
/// is asynchronous and the bridge must not post before it.
pub(crate) fn spawn(
    document: String,
    generation: u64,
    limits: SandboxLimits,
    output: Arc<OutputChannel>,
) -> std::io::Result<(
    WorkerHandle,
    oneshot::Receiver<std::result::Result<(), String>>,
)> {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();

    thread::Builder::new()
        .name(format!("playpen-sandbox-{generation}"))
        .spawn(move || worker_main(document, generation, limits, output, commands_rx, ready_tx))?;

    Ok((
        WorkerHandle {
            commands: commands_tx,
        },
        ready_rx,
    ))
}

fn worker_main(
    document: String,
    generation: u64,
    limits: SandboxLimits,
    output: Arc<OutputChannel>,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    ready: oneshot::Sender<std::result::Result<(), String>>,
) {
    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(format!("failed to create runtime: {e}")));
            return;
        }
    };
    runtime.set_memory_limit(limits.memory_limit);

    // Deadline for the eval currently in flight; the interrupt handler makes
    // the engine abort once it passes.
    let deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    {
        let deadline = deadline.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || {
            let deadline = deadline.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            deadline.map_or(false, |at| Instant::now() >= at)
        })));
    }

    let context = match Context::full(&runtime) {
        Ok(context) => context,
        Err(e) => {
            let _ = ready.send(Err(format!("failed to create context: {e}")));
            return;
        }
    };

    // Install the single outbound capability, then load the document. The
    // document's own `ready` event flows out like any other wire message.
    let bootstrap = context.with(|ctx| -> Result<(), rquickjs::Error> {
        let globals = ctx.globals();
        let forward = output.clone();
        let post = Func::from(move |raw: String| {
            forward.handle(generation, &raw);
        });
        globals.set(document::POST_FN, post)?;
        ctx.eval::<(), _>(document.as_str())?;
        Ok(())
    });
    if let Err(e) = bootstrap {
        let _ = ready.send(Err(format!("bootstrap failed: {e}")));
        return;
    }
    if ready.send(Ok(())).is_err() {
        // The bridge gave up waiting; nothing will ever talk to this context.
        debug!(generation, "ready receiver dropped; unloading context");
        return;
    }
    trace!(generation, "sandbox context ready");

    while let Some(command) = commands.blocking_recv() {
        match command {
            WorkerCommand::Deliver(raw) => {
                let started = Instant::now();
                set_deadline(&deadline, Some(started + limits.eval_timeout));
                let outcome = context.with(|ctx| -> Result<(), String> {
                    let receive: Function = ctx
                        .globals()
                        .get(document::RECEIVE_FN)
                        .map_err(|e| e.to_string())?;
                    match receive.call::<_, ()>((raw,)) {
                        Ok(()) => Ok(()),
                        Err(rquickjs::Error::Exception) => Err(format!("{:?}", ctx.catch())),
                        Err(e) => Err(e.to_string()),
                    }
                });
                set_deadline(&deadline, None);

                if let Err(description) = outcome {
                    // User-thrown values are caught inside the document; what
                    // reaches here is a deadline interrupt or broken plumbing.
                    let text = if started.elapsed() >= limits.eval_timeout {
                        format!(
                            "script timed out after {}ms",
                            limits.eval_timeout.as_millis()
                        )
                    } else {
                        description
                    };
                    warn!(generation, error = %text, "sandbox dispatch failed");
                    if let Ok(raw) = protocol::encode_sandbox_error(&text) {
                        output.handle(generation, &raw);
                    }
                }
            }
            WorkerCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!(generation, "command channel closed; unloading context");
}

fn set_deadline(deadline: &Mutex<Option<Instant>>, at: Option<Instant>) {
    *deadline.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = at;
}
