//! Wire protocol between the host and the isolated execution context.
//!
//! Both directions are JSON text carrying a literal `source` tag. The tags
//! are asymmetric so a message can never echo back through the channel and
//! be mistaken for inbound traffic.

use serde::{Deserialize, Serialize};

/// Source tag on sandbox -> host messages.
pub const SANDBOX_SOURCE: &str = "playground";

/// Source tag on host -> sandbox messages.
pub const HOST_SOURCE: &str = "playground-parent";

/// Events produced by the isolated context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SandboxMessage {
    /// The context finished initializing; run requests are now safe to post.
    Ready,
    /// One console call, values in argument order.
    Log { payload: Vec<serde_json::Value> },
    /// A reported failure, already reduced to text.
    Error { payload: String },
}

/// Requests posted into the isolated context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Run { code: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct SandboxEnvelope {
    source: String,
    #[serde(flatten)]
    message: SandboxMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct HostEnvelope {
    source: String,
    #[serde(flatten)]
    message: HostMessage,
}

/// Decode a raw sandbox -> host message.
///
/// Returns `None` for anything that does not parse as a sandbox event or
/// whose source tag is wrong. Such messages are noise on a shared channel,
/// not errors.
pub fn decode_sandbox(raw: &str) -> Option<SandboxMessage> {
    let envelope: SandboxEnvelope = serde_json::from_str(raw).ok()?;
    (envelope.source == SANDBOX_SOURCE).then_some(envelope.message)
}

/// Encode a Run Request.
pub fn encode_run(code: &str) -> serde_json::Result<String> {
    serde_json::to_string(&HostEnvelope {
        source: HOST_SOURCE.to_string(),
        message: HostMessage::Run {
            code: code.to_string(),
        },
    })
}

/// Encode an error event on the sandbox's behalf. Used by the worker when a
/// failure happens outside the document's own reporting, e.g. a deadline
/// interrupt that no JS catch clause can observe.
pub fn encode_sandbox_error(message: &str) -> serde_json::Result<String> {
    serde_json::to_string(&SandboxEnvelope {
        source: SANDBOX_SOURCE.to_string(),
        message: SandboxMessage::Error {
            payload: message.to_string(),
        },
    })
}
