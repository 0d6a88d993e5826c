//! Output channel: the single inbound handler for sandbox events, and the
//! console log they are rendered into.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tracing::trace;

use crate::protocol::{self, SandboxMessage};

/// Sentinel line appended when a freshly loaded context reports in.
pub const READY_LINE: &str = "[sandbox ready]";

/// Prefix for error events.
pub const ERROR_PREFIX: &str = "Error: ";

/// Receives raw messages from the isolated context, classifies them, and
/// appends formatted lines to an ordered log.
///
/// Delivery happens on the worker thread while readers live on the host
/// side, so appends are serialized behind a mutex. Events carry the
/// generation id of the context that produced them; anything from a replaced
/// context is discarded rather than misattributed to the live one.
pub struct OutputChannel {
    live: AtomicU64,
    lines: Mutex<Vec<String>>,
}

impl OutputChannel {
    pub fn new() -> Self {
        Self {
            live: AtomicU64::new(0),
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Mark `generation` as the live context. Events tagged with any other
    /// generation are discarded from now on.
    pub fn attach(&self, generation: u64) {
        self.live.store(generation, Ordering::SeqCst);
    }

    /// Handle one raw message produced by the context with id `generation`.
    ///
    /// Anything that is not a sandbox event for the live context is silently
    /// ignored: wrong generation, wrong source tag, unparseable shapes.
    pub fn handle(&self, generation: u64, raw: &str) {
        if generation != self.live.load(Ordering::SeqCst) {
            trace!(generation, "discarding event from replaced context");
            return;
        }
        let Some(message) = protocol::decode_sandbox(raw) else {
            trace!("ignoring message without a sandbox source tag");
            return;
        };
        let line = match message {
            SandboxMessage::Ready => READY_LINE.to_string(),
            SandboxMessage::Log { payload } => format_log_line(&payload),
            SandboxMessage::Error { payload } => format!("{ERROR_PREFIX}{payload}"),
        };
        self.append(line);
    }

    /// Empty the console log.
    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Snapshot of the rendered lines, in arrival order.
    pub fn lines(&self) -> Vec<String> {
        self.guard().clone()
    }

    fn append(&self, line: String) {
        self.guard().push(line);
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for OutputChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Render one `log` event: strings verbatim, everything else in an indented
/// structural form, items joined with a single space.
pub fn format_log_line(items: &[Value]) -> String {
    items.iter().map(render_value).collect::<Vec<_>>().join(" ")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        // Fall back to the compact form rather than dropping the item
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
