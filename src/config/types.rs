use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaypenConfig {
    pub sandbox: SandboxConfig,
    pub trigger: TriggerConfig,
}

/// Limits applied to the isolated execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// How long to wait for a freshly loaded context to signal ready, in
    /// milliseconds
    pub ready_timeout_ms: u64,
    /// Per-run execution deadline in milliseconds
    pub eval_timeout_ms: u64,
    /// Memory limit for the context in MB
    pub memory_limit_mb: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 2_000,
            eval_timeout_ms: 5_000,
            memory_limit_mb: 64,
        }
    }
}

/// Controls the edit-driven automatic run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Quiet period after an edit before the automatic re-run fires, in
    /// milliseconds
    pub debounce_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}
