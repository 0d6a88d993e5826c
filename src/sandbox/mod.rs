mod bridge;
mod document;
mod worker;

pub use bridge::SandboxBridge;
pub use document::sandbox_document;

use std::time::Duration;

/// Resource limits applied to the isolated context.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Deadline for a single delivered message, enforced via the engine's
    /// interrupt handler.
    pub eval_timeout: Duration,
    /// Engine memory limit in bytes.
    pub memory_limit: usize,
}
