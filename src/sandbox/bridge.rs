//! The sandbox bridge: owns exactly one isolated execution context at a
//! time and is the single point of truth for whether that context is loaded
//! with the current document version.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::console::OutputChannel;
use crate::error::{PlaypenError, Result};
use crate::protocol;
use crate::sandbox::document::sandbox_document;
use crate::sandbox::worker::{self, WorkerHandle};
use crate::sandbox::SandboxLimits;

pub struct SandboxBridge {
    limits: SandboxLimits,
    ready_timeout: Duration,
    output: Arc<OutputChannel>,
    state: Mutex<BridgeState>,
}

#[derive(Default)]
struct BridgeState {
    context: Option<LoadedContext>,
    generations: u64,
}

struct LoadedContext {
    generation: u64,
    document: String,
    handle: WorkerHandle,
}

impl SandboxBridge {
    pub fn new(limits: SandboxLimits, ready_timeout: Duration, output: Arc<OutputChannel>) -> Self {
        Self {
            limits,
            ready_timeout,
            output,
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Make sure the live context is loaded with the current document.
    ///
    /// Reloads only when the content changed or the worker went away;
    /// otherwise this is a no-op. A reload blocks until the fresh context
    /// signals ready, bounded by the configured timeout.
    pub async fn ensure_loaded(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_loaded_locked(&mut state).await
    }

    async fn ensure_loaded_locked(&self, state: &mut BridgeState) -> Result<()> {
        let document = sandbox_document();
        if let Some(context) = &state.context {
            if context.document == document && context.handle.is_alive() {
                return Ok(());
            }
        }

        // Drop the previous context first so its worker unloads; events still
        // in flight from it will fail the generation check.
        state.context = None;
        state.generations += 1;
        let generation = state.generations;
        debug!(generation, "loading sandbox context");

        // Attach before spawning: the context's own ready event must not be
        // discarded as stale.
        self.output.attach(generation);
        let (handle, ready) = worker::spawn(
            document.to_string(),
            generation,
            self.limits.clone(),
            self.output.clone(),
        )?;

        match tokio::time::timeout(self.ready_timeout, ready).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(message))) => return Err(PlaypenError::SandboxInit(message)),
            Ok(Err(_)) => {
                return Err(PlaypenError::SandboxInit(
                    "worker exited before signalling ready".to_string(),
                ))
            }
            Err(_) => {
                return Err(PlaypenError::ReadyTimeout {
                    millis: self.ready_timeout.as_millis() as u64,
                })
            }
        }

        state.context = Some(LoadedContext {
            generation,
            document: document.to_string(),
            handle,
        });
        Ok(())
    }

    /// Post one Run Request carrying `code` to the context.
    ///
    /// Fire and forget: nothing is observable synchronously; all effects
    /// arrive later as sandbox events. If the context went away between load
    /// and post, the request is dropped silently.
    pub async fn run(&self, code: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_loaded_locked(&mut state).await?;
        let Some(context) = &state.context else {
            return Ok(());
        };
        let raw = protocol::encode_run(code)?;
        if context.handle.deliver(raw).is_err() {
            debug!("run request dropped: no live context");
        }
        Ok(())
    }

    /// Wait until every message posted so far has been processed by the
    /// context. A host-side barrier; nothing crosses the wire.
    pub async fn flush(&self) -> Result<()> {
        let receiver = {
            let state = self.state.lock().await;
            let Some(context) = &state.context else {
                return Ok(());
            };
            let (ack, receiver) = oneshot::channel();
            if context.handle.flush(ack).is_err() {
                return Ok(());
            }
            receiver
        };
        // A worker that dies mid-flush counts as flushed
        let _ = receiver.await;
        Ok(())
    }

    /// Tear the live context down; the next `ensure_loaded` rebuilds it.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        if state.context.take().is_some() {
            debug!("sandbox context torn down");
        }
        self.output.attach(0);
    }

    /// Generation id of the live context (0 when nothing is loaded).
    pub async fn generation(&self) -> u64 {
        self.state
            .lock()
            .await
            .context
            .as_ref()
            .map(|context| context.generation)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::READY_LINE;
    use serde_json::json;

    fn fixture() -> (Arc<OutputChannel>, SandboxBridge) {
        let output = Arc::new(OutputChannel::new());
        let limits = SandboxLimits {
            eval_timeout: Duration::from_secs(2),
            memory_limit: 32 * 1024 * 1024,
        };
        let bridge = SandboxBridge::new(limits, Duration::from_secs(5), output.clone());
        (output, bridge)
    }

    async fn run_to_completion(bridge: &SandboxBridge, code: &str) -> Result<()> {
        bridge.run(code).await?;
        bridge.flush().await
    }

    #[tokio::test]
    async fn run_mirrors_console_output() {
        let (output, bridge) = fixture();
        run_to_completion(&bridge, "console.log(1+1)").await.unwrap();
        assert_eq!(output.lines(), vec![READY_LINE.to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn log_arguments_are_space_joined() {
        let (output, bridge) = fixture();
        run_to_completion(&bridge, "console.log('a', 1)").await.unwrap();
        assert_eq!(output.lines(), vec![READY_LINE.to_string(), "a 1".to_string()]);
    }

    #[tokio::test]
    async fn objects_render_as_indented_structures() {
        let (output, bridge) = fixture();
        run_to_completion(&bridge, "console.log({ a: 1 })").await.unwrap();
        let expected = serde_json::to_string_pretty(&json!({"a": 1})).unwrap();
        assert_eq!(output.lines(), vec![READY_LINE.to_string(), expected]);
    }

    #[tokio::test]
    async fn thrown_error_reports_its_message() {
        let (output, bridge) = fixture();
        run_to_completion(&bridge, r#"throw new Error("x")"#).await.unwrap();
        assert!(output.lines().contains(&"Error: x".to_string()));
    }

    #[tokio::test]
    async fn thrown_non_error_values_are_stringified() {
        let (output, bridge) = fixture();
        run_to_completion(&bridge, "throw 1").await.unwrap();
        assert!(output.lines().contains(&"Error: 1".to_string()));
    }

    #[tokio::test]
    async fn console_error_prefers_the_message_field() {
        let (output, bridge) = fixture();
        run_to_completion(&bridge, r#"console.error(new Error("bad"))"#)
            .await
            .unwrap();
        assert!(output.lines().contains(&"Error: bad".to_string()));
    }

    #[tokio::test]
    async fn context_survives_a_user_failure() {
        let (output, bridge) = fixture();
        run_to_completion(&bridge, "throw 'down'").await.unwrap();
        run_to_completion(&bridge, "console.log('still here')").await.unwrap();
        let lines = output.lines();
        assert_eq!(
            lines,
            vec![
                READY_LINE.to_string(),
                "Error: down".to_string(),
                "still here".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn ensure_loaded_is_idempotent() {
        let (output, bridge) = fixture();
        bridge.ensure_loaded().await.unwrap();
        bridge.ensure_loaded().await.unwrap();
        assert_eq!(bridge.generation().await, 1);
        // Exactly one ready event: one context load happened
        assert_eq!(output.lines(), vec![READY_LINE.to_string()]);
    }

    #[tokio::test]
    async fn consecutive_runs_share_one_context() {
        let (output, bridge) = fixture();
        run_to_completion(&bridge, "console.log('one')").await.unwrap();
        run_to_completion(&bridge, "console.log('two')").await.unwrap();
        assert_eq!(bridge.generation().await, 1);
        assert_eq!(
            output.lines(),
            vec![
                READY_LINE.to_string(),
                "one".to_string(),
                "two".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn reset_rebuilds_on_next_run() {
        let (output, bridge) = fixture();
        bridge.ensure_loaded().await.unwrap();
        bridge.reset().await;
        assert_eq!(bridge.generation().await, 0);
        run_to_completion(&bridge, "console.log('back')").await.unwrap();
        assert_eq!(bridge.generation().await, 2);
        // A second ready marks the second context load
        assert_eq!(
            output.lines(),
            vec![
                READY_LINE.to_string(),
                READY_LINE.to_string(),
                "back".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn globals_persist_within_one_context() {
        let (output, bridge) = fixture();
        run_to_completion(&bridge, "globalThis.counter = 41").await.unwrap();
        run_to_completion(&bridge, "console.log(counter + 1)").await.unwrap();
        assert!(output.lines().contains(&"42".to_string()));
    }

    #[tokio::test]
    async fn runaway_script_hits_the_deadline() {
        let output = Arc::new(OutputChannel::new());
        let limits = SandboxLimits {
            eval_timeout: Duration::from_millis(200),
            memory_limit: 32 * 1024 * 1024,
        };
        let bridge = SandboxBridge::new(limits, Duration::from_secs(5), output.clone());
        run_to_completion(&bridge, "while (true) {}").await.unwrap();
        let lines = output.lines();
        assert!(
            lines.iter().any(|line| line.starts_with("Error: script timed out")),
            "no timeout line in {lines:?}"
        );
    }

    #[tokio::test]
    async fn flush_without_a_context_is_a_no_op() {
        let (_, bridge) = fixture();
        bridge.flush().await.unwrap();
    }
}
