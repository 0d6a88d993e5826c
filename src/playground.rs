//! The host view: current script text, the execution trigger, the sandbox
//! bridge, and the console log.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::types::PlaypenConfig;
use crate::console::OutputChannel;
use crate::error::Result;
use crate::sandbox::{SandboxBridge, SandboxLimits};
use crate::session::ScratchStore;

/// A playground instance. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Playground {
    inner: Arc<Inner>,
}

struct Inner {
    bridge: SandboxBridge,
    output: Arc<OutputChannel>,
    script: Mutex<String>,
    scratch: Option<ScratchStore>,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    runs: watch::Sender<u64>,
}

impl Playground {
    pub fn new(config: &PlaypenConfig, scratch: Option<ScratchStore>) -> Self {
        let output = Arc::new(OutputChannel::new());
        let limits = SandboxLimits {
            eval_timeout: Duration::from_millis(config.sandbox.eval_timeout_ms),
            memory_limit: config.sandbox.memory_limit_mb as usize * 1024 * 1024,
        };
        let bridge = SandboxBridge::new(
            limits,
            Duration::from_millis(config.sandbox.ready_timeout_ms),
            output.clone(),
        );
        let (runs, _) = watch::channel(0u64);

        Self {
            inner: Arc::new(Inner {
                bridge,
                output,
                script: Mutex::new(String::new()),
                scratch,
                debounce: Duration::from_millis(config.trigger.debounce_ms),
                pending: Mutex::new(None),
                runs,
            }),
        }
    }

    /// Current script text.
    pub fn script(&self) -> String {
        lock(&self.inner.script).clone()
    }

    /// Replace the script text: persists it fire-and-forget and (re)arms the
    /// debounced automatic run. Each edit cancels the previously scheduled
    /// run, so at most one fires per quiescent period.
    pub fn set_script(&self, text: String) {
        *lock(&self.inner.script) = text.clone();

        if let Some(store) = &self.inner.scratch {
            let store = store.clone();
            tokio::spawn(async move {
                if let Err(e) = store.save(&text).await {
                    debug!(error = %e, "failed to persist scratch script");
                }
            });
        }

        self.schedule();
    }

    fn schedule(&self) {
        let mut pending = lock(&self.inner.pending);
        if let Some(task) = pending.take() {
            task.abort();
        }
        let playground = self.clone();
        let delay = self.inner.debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = playground.trigger().await {
                error!(error = %e, "debounced run failed");
            }
        }));
    }

    /// Explicit run: cancels any pending debounced run and executes the
    /// current script immediately.
    pub async fn run_now(&self) -> Result<()> {
        if let Some(task) = lock(&self.inner.pending).take() {
            task.abort();
        }
        self.trigger().await
    }

    async fn trigger(&self) -> Result<()> {
        // Clear first: no output from a previous run may interleave with
        // this run's output.
        self.inner.output.clear();
        let code = self.script();
        self.inner.bridge.run(&code).await?;
        self.inner.bridge.flush().await?;
        self.inner.runs.send_modify(|count| *count += 1);
        Ok(())
    }

    /// Empty the console without touching the sandbox or pending runs.
    pub fn clear_console(&self) {
        self.inner.output.clear();
    }

    /// Snapshot of the console log, in arrival order.
    pub fn console_lines(&self) -> Vec<String> {
        self.inner.output.lines()
    }

    /// Number of completed triggered runs.
    pub fn run_count(&self) -> u64 {
        *self.inner.runs.borrow()
    }

    /// Subscribe to run completions.
    pub fn runs(&self) -> watch::Receiver<u64> {
        self.inner.runs.subscribe()
    }

    /// Tear down the live context; the next run rebuilds it.
    pub async fn reset_sandbox(&self) {
        self.inner.bridge.reset().await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::TriggerConfig;
    use crate::console::READY_LINE;

    fn test_config(debounce_ms: u64) -> PlaypenConfig {
        PlaypenConfig {
            trigger: TriggerConfig { debounce_ms },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn run_now_executes_the_current_script() {
        let playground = Playground::new(&test_config(10_000), None);
        playground.set_script("console.log('hello')".to_string());
        playground.run_now().await.unwrap();
        assert_eq!(
            playground.console_lines(),
            vec![READY_LINE.to_string(), "hello".to_string()]
        );
        assert_eq!(playground.run_count(), 1);
    }

    #[tokio::test]
    async fn a_new_run_clears_previous_output() {
        let playground = Playground::new(&test_config(10_000), None);
        playground.set_script("console.log('first')".to_string());
        playground.run_now().await.unwrap();
        playground.set_script("console.log('second')".to_string());
        playground.run_now().await.unwrap();
        // Same context, so no second ready line; and nothing of the first
        // run's output survives the clear.
        assert_eq!(playground.console_lines(), vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn burst_of_edits_triggers_exactly_one_run() {
        let playground = Playground::new(&test_config(100), None);
        for i in 0..4 {
            playground.set_script(format!("console.log({i})"));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        // Wait well past the quiescent window for the single run to land
        let mut runs = playground.runs();
        tokio::time::timeout(Duration::from_secs(5), runs.changed())
            .await
            .expect("debounced run never fired")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(playground.run_count(), 1);
        // Only the last edit in the burst ran
        assert_eq!(
            playground.console_lines(),
            vec![READY_LINE.to_string(), "3".to_string()]
        );
    }

    #[tokio::test]
    async fn explicit_run_cancels_the_pending_debounce() {
        let playground = Playground::new(&test_config(100), None);
        playground.set_script("console.log('once')".to_string());
        playground.run_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        // The debounced task scheduled by set_script must not fire a second run
        assert_eq!(playground.run_count(), 1);
    }

    #[tokio::test]
    async fn clear_console_leaves_pending_state_alone() {
        let playground = Playground::new(&test_config(10_000), None);
        playground.set_script("console.log('x')".to_string());
        playground.run_now().await.unwrap();
        playground.clear_console();
        assert!(playground.console_lines().is_empty());
        assert_eq!(playground.run_count(), 1);
    }

    #[tokio::test]
    async fn edits_are_persisted_to_the_scratch_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::at(dir.path().join("scratch.js"));
        let playground = Playground::new(&test_config(10_000), Some(store.clone()));
        playground.set_script("console.log('kept')".to_string());
        playground.run_now().await.unwrap();
        // Persistence is fire-and-forget; give the write a moment
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.load().await.as_deref(), Some("console.log('kept')"));
    }

    #[tokio::test]
    async fn reset_forces_a_fresh_context_on_the_next_run() {
        let playground = Playground::new(&test_config(10_000), None);
        playground.set_script("console.log('a')".to_string());
        playground.run_now().await.unwrap();
        playground.reset_sandbox().await;
        playground.run_now().await.unwrap();
        // Fresh context: the ready sentinel appears again after the clear
        assert_eq!(
            playground.console_lines(),
            vec![READY_LINE.to_string(), "a".to_string()]
        );
    }
}
