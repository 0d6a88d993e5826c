use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaypenError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    // Sandbox errors
    #[error("Sandbox initialization failed: {0}")]
    SandboxInit(String),

    #[error("Sandbox did not become ready within {millis}ms")]
    ReadyTimeout { millis: u64 },

    // Script errors
    #[error("Failed to read script '{path}': {source}")]
    ScriptRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Watch errors
    #[error("File watcher error: {0}")]
    Watch(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PlaypenError>;
